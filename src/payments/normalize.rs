//! Declarative extraction of canonical fields from provider callbacks.
//!
//! Each provider lists, per canonical field, the candidate paths where that
//! field may live. Path segments are dot separated and object keys match
//! case-insensitively, so `data.clientTransactionId` also finds
//! `Data.ClientTransactionId`.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Amount,
    ClientTransactionId,
    TransactionId,
    Status,
    StoreId,
    AuthorizationCode,
}

impl Field {
    pub const fn as_str(self) -> &'static str {
        match self {
            Field::Amount => "amount",
            Field::ClientTransactionId => "client_transaction_id",
            Field::TransactionId => "transaction_id",
            Field::Status => "status",
            Field::StoreId => "store_id",
            Field::AuthorizationCode => "authorization_code",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: Field,
    pub paths: &'static [&'static str],
    pub required: bool,
}

impl FieldRule {
    pub const fn required(field: Field, paths: &'static [&'static str]) -> Self {
        Self {
            field,
            paths,
            required: true,
        }
    }

    pub const fn optional(field: Field, paths: &'static [&'static str]) -> Self {
        Self {
            field,
            paths,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Code(i64),
    Text(String),
}

/// Provider-independent view of one callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// Integer minor currency units.
    pub amount: Option<i64>,
    pub client_transaction_id: Option<String>,
    pub transaction_id: Option<String>,
    pub status: Option<Status>,
    pub store_id: Option<String>,
    pub authorization_code: Option<String>,
}

impl NormalizedEvent {
    /// Journal key for this payment event.
    pub fn correlation_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .or(self.client_transaction_id.as_deref())
    }
}

const APPROVED_TEXT: &[&str] = &["approved", "completed", "paid", "success", "succeeded"];

/// Whether a status denotes a settled payment. Numeric codes are matched
/// against the provider's approved set, text against the common success words.
pub fn status_is_approved(status: &Status, approved_codes: &[i64]) -> bool {
    match status {
        Status::Code(code) => approved_codes.contains(code),
        Status::Text(text) => {
            let text = text.trim();
            APPROVED_TEXT.iter().any(|t| t.eq_ignore_ascii_case(text))
        }
    }
}

/// Extracts the canonical field set. Every missing required field is
/// reported at once, and an event must carry at least one correlation id.
pub fn normalize(payload: &Value, rules: &[FieldRule]) -> Result<NormalizedEvent> {
    let mut event = NormalizedEvent::default();
    let mut missing = Vec::new();

    for rule in rules {
        let found = rule.paths.iter().find_map(|path| lookup(payload, path));
        let Some(value) = found else {
            if rule.required {
                missing.push(rule.field.as_str());
            }
            continue;
        };

        match rule.field {
            Field::Amount => {
                event.amount = Some(parse_minor_units(value).ok_or_else(|| {
                    Error::BadRequest(format!("amount is not an integer: {value}"))
                })?);
            }
            Field::Status => event.status = Some(parse_status(value)),
            Field::ClientTransactionId => event.client_transaction_id = as_text(value),
            Field::TransactionId => event.transaction_id = as_text(value),
            Field::StoreId => event.store_id = as_text(value),
            Field::AuthorizationCode => event.authorization_code = as_text(value),
        }
    }

    if event.correlation_id().is_none() && !missing.contains(&Field::ClientTransactionId.as_str())
    {
        missing.push(Field::ClientTransactionId.as_str());
    }

    if !missing.is_empty() {
        return Err(Error::MissingFields(missing));
    }
    Ok(event)
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        let object = current.as_object()?;
        current = match object.get(segment) {
            Some(v) => v,
            None => object
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(segment))
                .map(|(_, v)| v)?,
        };
    }

    match current {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        v => Some(v),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_minor_units(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_status(value: &Value) -> Status {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Status::Code)
            .unwrap_or_else(|| Status::Text(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Status::Code)
            .unwrap_or_else(|_| Status::Text(s.trim().to_string())),
        Value::Bool(true) => Status::Text("success".to_string()),
        other => Status::Text(other.to_string()),
    }
}

/// Converts an order total to minor units. Totals with sub-cent precision
/// have no exact conversion and yield `None`.
pub fn to_minor_units(total: Decimal) -> Option<i64> {
    let scaled = total * Decimal::ONE_HUNDRED;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.to_i64()
}
