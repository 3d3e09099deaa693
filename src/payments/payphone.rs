use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use super::normalize::{Field, status_is_approved};
use super::{
    Acknowledgement, FieldRule, NormalizedEvent, PaymentProvider, PaymentSession, WebhookDelivery,
    WebhookOutcome,
};
use crate::error::{Error, Result};
use crate::types::Order;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
const APPROVED_STATUS_CODE: i64 = 3;

const RULES: &[FieldRule] = &[
    FieldRule::required(
        Field::ClientTransactionId,
        &["ClientTransactionId", "client_transaction_id", "data.ClientTransactionId"],
    ),
    FieldRule::optional(
        Field::TransactionId,
        &["TransactionId", "transaction_id", "data.TransactionId"],
    ),
    FieldRule::required(Field::Amount, &["Amount", "data.Amount"]),
    FieldRule::required(
        Field::Status,
        &[
            "StatusCode",
            "status_code",
            "data.StatusCode",
            "TransactionStatus",
            "transaction_status",
            "data.TransactionStatus",
        ],
    ),
    FieldRule::optional(Field::StoreId, &["StoreId", "store_id", "data.StoreId"]),
    FieldRule::optional(
        Field::AuthorizationCode,
        &["AuthorizationCode", "authorization_code", "data.AuthorizationCode"],
    ),
];

/// Hosted payment box provider. Callbacks are tied to our store id and signed
/// with HMAC-SHA256 over the raw body. Without a secret every callback is
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct PayphoneProvider {
    store_id: Option<String>,
    webhook_secret: Option<String>,
}

impl PayphoneProvider {
    pub fn new(store_id: Option<String>, webhook_secret: Option<String>) -> Self {
        Self {
            store_id,
            webhook_secret,
        }
    }

    fn signature_valid(&self, delivery: &WebhookDelivery) -> bool {
        let Some(secret) = self.webhook_secret.as_deref() else {
            tracing::warn!("payphone callback rejected, no webhook secret configured");
            return false;
        };
        let Some(signature) = delivery.header(SIGNATURE_HEADER) else {
            tracing::warn!("payphone callback without signature header");
            return false;
        };
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            tracing::error!("payphone webhook secret unusable as HMAC key");
            return false;
        };
        mac.update(&delivery.body);
        mac.verify_slice(&expected).is_ok()
    }

    fn error_code(error: &Error) -> &'static str {
        match error {
            Error::MissingFields(_) => "MISSING_FIELDS",
            Error::SignatureInvalid => "SIGNATURE_INVALID",
            Error::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Error::BadRequest(_) => "BAD_REQUEST",
            e if e.is_retryable() => "INTERNAL_ERROR",
            _ => "REJECTED",
        }
    }
}

/// Hex HMAC-SHA256 of `body`, as carried in the signature header.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl PaymentProvider for PayphoneProvider {
    fn name(&self) -> &'static str {
        "payphone"
    }

    fn field_rules(&self) -> &'static [FieldRule] {
        RULES
    }

    fn authenticate(&self, delivery: &WebhookDelivery, event: &NormalizedEvent) -> bool {
        if let Some(expected) = self.store_id.as_deref() {
            if event.store_id.as_deref() != Some(expected) {
                tracing::warn!(
                    reported = event.store_id.as_deref().unwrap_or("-"),
                    "payphone callback for a different store"
                );
                return false;
            }
        }
        self.signature_valid(delivery)
    }

    fn is_approved(&self, event: &NormalizedEvent) -> bool {
        event
            .status
            .as_ref()
            .is_some_and(|status| status_is_approved(status, &[APPROVED_STATUS_CODE]))
    }

    fn create_session(&self, order: &Order, amount: i64, _public_base_url: &str) -> PaymentSession {
        PaymentSession {
            provider: self.name().to_string(),
            order_id: order.id.clone(),
            client_transaction_id: order.client_transaction_id.clone(),
            amount,
            currency: "USD",
            payment_intent_id: None,
            checkout_url: None,
            store_id: self.store_id.clone(),
        }
    }

    fn acknowledge(&self, result: &Result<WebhookOutcome>) -> Acknowledgement {
        match result {
            Ok(_) => Acknowledgement {
                status: 200,
                body: json!({ "Response": true, "ErrorCode": null }),
            },
            Err(e) => Acknowledgement {
                status: if e.is_retryable() { 500 } else { 200 },
                body: json!({ "Response": false, "ErrorCode": Self::error_code(e) }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::payments::{Status, normalize};

    fn event(store_id: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            amount: Some(600),
            client_transaction_id: Some("ctx".into()),
            status: Some(Status::Code(3)),
            store_id: store_id.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_pascal_and_nested_payloads() {
        let flat = json!({
            "ClientTransactionId": "ctx",
            "TransactionId": 8812,
            "Amount": 600,
            "StatusCode": 3,
            "StoreId": "store-1",
            "AuthorizationCode": "W1234"
        });
        let nested = json!({ "data": flat.clone() });

        let a = normalize(&flat, RULES).unwrap();
        let b = normalize(&nested, RULES).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.correlation_id(), Some("8812"));
        assert_eq!(a.authorization_code.as_deref(), Some("W1234"));
        assert!(PayphoneProvider::default().is_approved(&a));
    }

    #[test]
    fn test_textual_status() {
        let event = normalize(
            &json!({"clientTransactionId": "c", "amount": "100", "transactionStatus": "Approved"}),
            RULES,
        )
        .unwrap();
        assert!(PayphoneProvider::default().is_approved(&event));

        let canceled = normalize(
            &json!({"ClientTransactionId": "c", "Amount": 100, "StatusCode": 2}),
            RULES,
        )
        .unwrap();
        assert!(!PayphoneProvider::default().is_approved(&canceled));
    }

    #[test]
    fn test_store_id_must_match() {
        let provider = PayphoneProvider::new(Some("store-1".into()), Some("s3cret".into()));
        let delivery = WebhookDelivery::new("{}")
            .with_header("X-Signature", sign("s3cret", b"{}").unwrap());

        assert!(provider.authenticate(&delivery, &event(Some("store-1"))));
        assert!(!provider.authenticate(&delivery, &event(Some("store-2"))));
        assert!(!provider.authenticate(&delivery, &event(None)));
    }

    #[test]
    fn test_missing_secret_rejects_everything() {
        let open = PayphoneProvider::default();
        let unsigned = WebhookDelivery::new("{}");
        assert!(!open.authenticate(&unsigned, &event(None)));

        let store_only = PayphoneProvider::new(Some("store-1".into()), None);
        let signed = WebhookDelivery::new("{}")
            .with_header("X-Signature", sign("s3cret", b"{}").unwrap());
        assert!(!store_only.authenticate(&signed, &event(Some("store-1"))));
    }

    #[test]
    fn test_hmac_signature() {
        let provider = PayphoneProvider::new(None, Some("s3cret".into()));
        let body = br#"{"ClientTransactionId":"ctx"}"#.to_vec();
        let signature = sign("s3cret", &body).unwrap();

        let signed = WebhookDelivery::new(body.clone()).with_header("X-Signature", signature);
        assert!(provider.authenticate(&signed, &event(None)));

        let forged = WebhookDelivery::new(body.clone())
            .with_header("X-Signature", sign("other", &body).unwrap());
        assert!(!provider.authenticate(&forged, &event(None)));

        let unsigned = WebhookDelivery::new(body);
        assert!(!provider.authenticate(&unsigned, &event(None)));
    }

    #[test]
    fn test_acknowledgement_envelope() {
        let provider = PayphoneProvider::default();

        let ok = provider.acknowledge(&Ok(WebhookOutcome::Duplicate));
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body, json!({"Response": true, "ErrorCode": null}));

        let mismatch = provider.acknowledge(&Err(Error::AmountMismatch {
            expected: Decimal::new(600, 2),
            reported: 500,
        }));
        assert_eq!(mismatch.status, 200);
        assert_eq!(
            mismatch.body,
            json!({"Response": false, "ErrorCode": "AMOUNT_MISMATCH"})
        );

        let io = provider.acknowledge(&Err(Error::Io(std::io::Error::other("disk"))));
        assert_eq!(io.status, 500);
    }
}
