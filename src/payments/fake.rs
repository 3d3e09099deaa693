use super::{FieldRule, NormalizedEvent, PaymentProvider, PaymentSession, WebhookDelivery};
use super::normalize::{Field, status_is_approved};
use crate::types::Order;

/// Unsigned provider for local development. Only registered in dev mode.
#[derive(Debug, Default)]
pub struct FakeProvider;

const RULES: &[FieldRule] = &[
    FieldRule::optional(
        Field::TransactionId,
        &["paymentIntentId", "payment_intent_id"],
    ),
    FieldRule::optional(
        Field::ClientTransactionId,
        &["clientTransactionId", "client_transaction_id"],
    ),
    FieldRule::optional(Field::Amount, &["amount"]),
    FieldRule::optional(Field::Status, &["status"]),
];

impl PaymentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn field_rules(&self) -> &'static [FieldRule] {
        RULES
    }

    fn authenticate(&self, _delivery: &WebhookDelivery, _event: &NormalizedEvent) -> bool {
        true
    }

    fn is_approved(&self, event: &NormalizedEvent) -> bool {
        event
            .status
            .as_ref()
            .is_none_or(|status| status_is_approved(status, &[]))
    }

    fn create_session(&self, order: &Order, amount: i64, public_base_url: &str) -> PaymentSession {
        let intent = format!("fake_{}", order.id);
        PaymentSession {
            provider: self.name().to_string(),
            order_id: order.id.clone(),
            client_transaction_id: order.client_transaction_id.clone(),
            amount,
            currency: "USD",
            checkout_url: Some(format!(
                "{}/dev/checkout?pi={intent}",
                public_base_url.trim_end_matches('/')
            )),
            payment_intent_id: Some(intent),
            store_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::payments::normalize;
    use crate::payments::Status;

    #[test]
    fn test_accepts_both_casings() {
        let camel = normalize(&json!({"paymentIntentId": "pi_1", "amount": 600}), RULES).unwrap();
        let snake = normalize(&json!({"payment_intent_id": "pi_1", "amount": 600}), RULES).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.correlation_id(), Some("pi_1"));
    }

    #[test]
    fn test_missing_status_means_approved() {
        let mut event = NormalizedEvent::default();
        assert!(FakeProvider.is_approved(&event));
        event.status = Some(Status::Text("failed".into()));
        assert!(!FakeProvider.is_approved(&event));
        event.status = Some(Status::Text("paid".into()));
        assert!(FakeProvider.is_approved(&event));
    }
}
