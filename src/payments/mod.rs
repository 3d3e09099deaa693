//! Payment providers and the webhook pipeline.

mod fake;
mod normalize;
mod payphone;
mod processor;

pub use fake::FakeProvider;
pub use normalize::{
    Field, FieldRule, NormalizedEvent, Status, normalize, status_is_approved, to_minor_units,
};
pub use payphone::{PayphoneProvider, SIGNATURE_HEADER, sign};
pub use processor::{PaymentProcessor, WebhookOutcome};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::PaymentsConfig;
use crate::error::{Error, Result};
use crate::types::Order;

/// A raw callback as received: lower-cased header names and the untouched body.
#[derive(Debug, Clone, Default)]
pub struct WebhookDelivery {
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl WebhookDelivery {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub provider: String,
    pub order_id: String,
    pub client_transaction_id: String,
    /// Order total in minor units.
    pub amount: i64,
    pub currency: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

/// The response a provider expects back from its callback.
#[derive(Debug, Clone)]
pub struct Acknowledgement {
    pub status: u16,
    pub body: Value,
}

pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Where each canonical field may appear in this provider's payloads.
    fn field_rules(&self) -> &'static [FieldRule];

    /// Signature or shared-secret check for a normalized delivery.
    fn authenticate(&self, delivery: &WebhookDelivery, event: &NormalizedEvent) -> bool;

    fn is_approved(&self, event: &NormalizedEvent) -> bool;

    fn create_session(&self, order: &Order, amount: i64, public_base_url: &str)
    -> PaymentSession;

    /// Maps a processing result to the provider's acknowledgement shape.
    /// Store failures answer 500 so the provider retries; everything else is
    /// acknowledged so a payload that can never succeed is not redelivered.
    fn acknowledge(&self, result: &Result<WebhookOutcome>) -> Acknowledgement {
        match result {
            Ok(outcome) => Acknowledgement {
                status: 200,
                body: json!({ "data": outcome, "error": null }),
            },
            Err(e) => Acknowledgement {
                status: if e.is_retryable() { 500 } else { 200 },
                body: json!({ "data": null, "error": e.to_string() }),
            },
        }
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers payphone always and the unsigned fake provider only in dev mode.
    pub fn from_config(config: &PaymentsConfig, dev_mode: bool) -> Self {
        let mut registry = Self::new();
        if config.payphone.webhook_secret.is_none() {
            tracing::warn!("payphone webhook secret not set, payphone callbacks will be rejected");
        }
        registry.register(Arc::new(PayphoneProvider::new(
            config.payphone.store_id.clone(),
            config.payphone.webhook_secret.clone(),
        )));
        if dev_mode {
            registry.register(Arc::new(FakeProvider));
        }
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.providers.get(name).cloned().ok_or(Error::NotFound)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
