use std::sync::Arc;

use serde::Serialize;

use super::normalize::{NormalizedEvent, normalize, to_minor_units};
use super::{Acknowledgement, PaymentProvider, PaymentSession, ProviderRegistry, WebhookDelivery};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::orders::OrderService;
use crate::store::{Store, StoreTx, in_transaction};
use crate::types::{Order, OrderState, WebhookEvent};

/// What a webhook delivery ended up doing. Every variant is acknowledged to
/// the provider as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event was already journaled.
    Duplicate,
    /// No order matches the event's identifiers.
    OrderNotFound,
    /// Journaled, but the provider reports a non-approved status.
    NotApproved,
    /// The order had already moved past pending.
    AlreadySettled,
    Paid { numbers: Vec<i64> },
    /// The order is paid but assignment failed; it can be retried by order id.
    PaidAssignmentFailed { error: String },
}

/// Result of the journal-and-settle transaction. Rejections are committed
/// like any other step so the journal row survives them.
enum Settlement {
    Duplicate,
    Rejected(Error),
    OrderNotFound,
    NotApproved,
    AlreadySettled,
    Paid(Order),
}

pub struct PaymentProcessor {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    orders: Arc<OrderService>,
    registry: Arc<ProviderRegistry>,
    public_base_url: String,
}

impl PaymentProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        orders: Arc<OrderService>,
        registry: Arc<ProviderRegistry>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            orders,
            registry,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Prepares a payment attempt for a pending order.
    pub fn create_session(&self, provider: &str, order_id: &str) -> Result<PaymentSession> {
        let provider = self.registry.get(provider)?;
        let order = self.store.get_order(order_id)?.ok_or(Error::NotFound)?;
        if order.state != OrderState::Pending {
            return Err(Error::InvalidState(format!(
                "order {order_id} is {}, sessions require pending",
                order.state
            )));
        }
        let amount = to_minor_units(order.total).ok_or_else(|| {
            Error::InvalidState(format!("order total {} has no exact minor units", order.total))
        })?;

        let session = provider.create_session(&order, amount, &self.public_base_url);
        if let Some(intent) = session.payment_intent_id.as_deref() {
            if !self
                .store
                .set_order_payment_intent(&order.id, intent, self.clock.now())?
            {
                tracing::debug!(order_id, "payment intent already recorded");
            }
        }

        tracing::info!(order_id, provider = provider.name(), "payment session created");
        Ok(session)
    }

    /// Processes a delivery and renders the provider's acknowledgement.
    /// Only an unknown provider name is returned as an error.
    pub fn acknowledge_webhook(
        &self,
        provider: &str,
        delivery: &WebhookDelivery,
    ) -> Result<Acknowledgement> {
        let provider = self.registry.get(provider)?;
        let result = self.process_webhook(provider.as_ref(), delivery);

        match &result {
            Ok(outcome) => {
                tracing::info!(provider = provider.name(), ?outcome, "webhook processed");
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(provider = provider.name(), "Webhook processing failed: {e}");
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), "Webhook rejected: {e}");
            }
        }

        Ok(provider.acknowledge(&result))
    }

    pub fn process_webhook(
        &self,
        provider: &dyn PaymentProvider,
        delivery: &WebhookDelivery,
    ) -> Result<WebhookOutcome> {
        let payload: serde_json::Value = serde_json::from_slice(&delivery.body)
            .map_err(|e| Error::BadRequest(format!("webhook body is not JSON: {e}")))?;
        let event = normalize(&payload, provider.field_rules())?;
        let correlation_id = event
            .correlation_id()
            .ok_or(Error::MissingFields(vec!["client_transaction_id"]))?
            .to_string();

        let signature_valid = provider.authenticate(delivery, &event);
        let journal = WebhookEvent {
            provider: provider.name().to_string(),
            payment_intent_id: correlation_id.clone(),
            signature_valid,
            payload: String::from_utf8_lossy(&delivery.body).into_owned(),
            processed_at: self.clock.now(),
        };

        // Journal row and order transition commit or roll back together.
        let settlement = in_transaction(self.store.as_ref(), |tx| {
            self.settle(tx, provider, &event, &journal)
        })?;

        let order = match settlement {
            Settlement::Duplicate => return Ok(WebhookOutcome::Duplicate),
            Settlement::Rejected(e) => return Err(e),
            Settlement::OrderNotFound => {
                tracing::warn!(correlation_id, "webhook for unknown order");
                return Ok(WebhookOutcome::OrderNotFound);
            }
            Settlement::NotApproved => {
                tracing::info!(correlation_id, status = ?event.status, "payment not approved");
                return Ok(WebhookOutcome::NotApproved);
            }
            Settlement::AlreadySettled => return Ok(WebhookOutcome::AlreadySettled),
            Settlement::Paid(order) => order,
        };
        self.orders.announce_payment(&order);

        match self.orders.assignments().assign(&order.id) {
            Ok(result) => Ok(WebhookOutcome::Paid {
                numbers: result.numbers,
            }),
            Err(e) => {
                tracing::error!(order_id = %order.id, "Assignment after payment failed: {e}");
                Ok(WebhookOutcome::PaidAssignmentFailed {
                    error: e.to_string(),
                })
            }
        }
    }

    fn settle(
        &self,
        tx: &dyn StoreTx,
        provider: &dyn PaymentProvider,
        event: &NormalizedEvent,
        journal: &WebhookEvent,
    ) -> Result<Settlement> {
        if !tx.record_webhook_event(journal)? {
            // An unsigned row must not block the genuine delivery behind it.
            if !(journal.signature_valid && tx.upgrade_webhook_event(journal)?) {
                return Ok(Settlement::Duplicate);
            }
        }

        if !journal.signature_valid {
            return Ok(Settlement::Rejected(Error::SignatureInvalid));
        }

        let Some(order) = locate_order(
            tx,
            event.client_transaction_id.as_deref(),
            event.transaction_id.as_deref(),
        )?
        else {
            return Ok(Settlement::OrderNotFound);
        };

        if let Some(reported) = event.amount {
            if to_minor_units(order.total) != Some(reported) {
                self.orders.cancel_in(tx, &order.id)?;
                return Ok(Settlement::Rejected(Error::AmountMismatch {
                    expected: order.total,
                    reported,
                }));
            }
        }

        if !provider.is_approved(event) {
            return Ok(Settlement::NotApproved);
        }

        if order.state != OrderState::Pending
            || !self
                .orders
                .confirm_payment_in(tx, &order.id, event.transaction_id.as_deref())?
        {
            return Ok(Settlement::AlreadySettled);
        }
        Ok(Settlement::Paid(order))
    }
}

fn locate_order(
    tx: &dyn StoreTx,
    client_transaction_id: Option<&str>,
    transaction_id: Option<&str>,
) -> Result<Option<Order>> {
    if let Some(id) = client_transaction_id {
        if let Some(order) = tx.get_order_by_client_transaction_id(id)? {
            return Ok(Some(order));
        }
    }
    match transaction_id {
        Some(id) => tx.get_order_by_payment_intent_id(id),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{DateTime, Utc};
    use rusqlite::ffi;
    use rust_decimal::Decimal;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::clock::SystemClock;
    use crate::notify::{LogNotifier, Notifier};
    use crate::orders::{
        AssignmentEngine, CheckoutRequest, DEFAULT_MAX_ATTEMPTS_PER_TICKET, SeededDraw,
    };
    use crate::payments::{FakeProvider, PayphoneProvider, sign};
    use crate::store::SqliteStore;
    use crate::types::{OrderNumbers, Raffle, RaffleState, RecoveryToken, Token};

    /// Delegates to SQLite, but can fail the next transaction after its body ran.
    struct FlakyStore {
        inner: Arc<SqliteStore>,
        fail_next_commit: AtomicBool,
    }

    impl Store for FlakyStore {
        fn initialize(&self) -> Result<()> {
            self.inner.initialize()
        }

        fn transaction(&self, f: &mut dyn FnMut(&dyn StoreTx) -> Result<()>) -> Result<()> {
            let fail = self.fail_next_commit.swap(false, Ordering::SeqCst);
            self.inner.transaction(&mut |tx| {
                f(tx)?;
                if fail {
                    return Err(Error::Database(rusqlite::Error::SqliteFailure(
                        ffi::Error::new(ffi::SQLITE_BUSY),
                        None,
                    )));
                }
                Ok(())
            })
        }

        fn create_raffle(&self, raffle: &Raffle) -> Result<()> {
            self.inner.create_raffle(raffle)
        }
        fn get_raffle(&self, id: &str) -> Result<Option<Raffle>> {
            self.inner.get_raffle(id)
        }
        fn update_raffle(&self, raffle: &Raffle) -> Result<()> {
            self.inner.update_raffle(raffle)
        }
        fn create_order(&self, order: &Order) -> Result<()> {
            self.inner.create_order(order)
        }
        fn get_order(&self, id: &str) -> Result<Option<Order>> {
            self.inner.get_order(id)
        }
        fn get_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
            self.inner.get_order_by_idempotency_key(key)
        }
        fn get_order_by_client_transaction_id(&self, id: &str) -> Result<Option<Order>> {
            self.inner.get_order_by_client_transaction_id(id)
        }
        fn get_order_by_payment_intent_id(&self, id: &str) -> Result<Option<Order>> {
            self.inner.get_order_by_payment_intent_id(id)
        }
        fn client_transaction_id_exists(&self, id: &str) -> Result<bool> {
            self.inner.client_transaction_id_exists(id)
        }
        fn transition_order(
            &self,
            id: &str,
            from: OrderState,
            to: OrderState,
            now: DateTime<Utc>,
        ) -> Result<bool> {
            self.inner.transition_order(id, from, to, now)
        }
        fn set_order_payment_intent(
            &self,
            id: &str,
            payment_intent_id: &str,
            now: DateTime<Utc>,
        ) -> Result<bool> {
            self.inner.set_order_payment_intent(id, payment_intent_id, now)
        }
        fn list_orders_by_state(&self, state: OrderState) -> Result<Vec<Order>> {
            self.inner.list_orders_by_state(state)
        }
        fn list_order_numbers(&self, order_id: &str) -> Result<Vec<i64>> {
            self.inner.list_order_numbers(order_id)
        }
        fn list_orders_with_numbers(
            &self,
            email: &str,
            states: &[OrderState],
        ) -> Result<Vec<OrderNumbers>> {
            self.inner.list_orders_with_numbers(email, states)
        }
        fn count_assignments(&self, raffle_id: &str) -> Result<i64> {
            self.inner.count_assignments(raffle_id)
        }
        fn record_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
            self.inner.record_webhook_event(event)
        }
        fn upgrade_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
            self.inner.upgrade_webhook_event(event)
        }
        fn get_webhook_event(&self, payment_intent_id: &str) -> Result<Option<WebhookEvent>> {
            self.inner.get_webhook_event(payment_intent_id)
        }
        fn count_webhook_events(&self, payment_intent_id: &str) -> Result<i64> {
            self.inner.count_webhook_events(payment_intent_id)
        }
        fn create_token(&self, token: &Token) -> Result<()> {
            self.inner.create_token(token)
        }
        fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
            self.inner.get_token_by_lookup(lookup)
        }
        fn update_token_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
            self.inner.update_token_last_used(id, now)
        }
        fn has_admin_token(&self) -> Result<bool> {
            self.inner.has_admin_token()
        }
        fn create_recovery_token(&self, token: &RecoveryToken) -> Result<()> {
            self.inner.create_recovery_token(token)
        }
        fn get_recovery_token(&self, token_hash: &str) -> Result<Option<RecoveryToken>> {
            self.inner.get_recovery_token(token_hash)
        }
        fn consume_recovery_token(&self, token_hash: &str) -> Result<bool> {
            self.inner.consume_recovery_token(token_hash)
        }
    }

    struct Fixture {
        _temp: TempDir,
        store: Arc<SqliteStore>,
        flaky: Arc<FlakyStore>,
        orders: Arc<OrderService>,
        processor: PaymentProcessor,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("test.db")).unwrap());
        store.initialize().unwrap();
        store
            .create_raffle(&Raffle {
                id: "r-1".to_string(),
                title: "Motorbike".to_string(),
                description: None,
                unit_price: Decimal::new(300, 2),
                stock_total: 10,
                stock_assigned: 0,
                state: RaffleState::Published,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        let flaky = Arc::new(FlakyStore {
            inner: store.clone(),
            fail_next_commit: AtomicBool::new(false),
        });

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let engine = Arc::new(AssignmentEngine::new(
            flaky.clone(),
            clock.clone(),
            Arc::new(SeededDraw::new(21)),
            notifier.clone(),
            DEFAULT_MAX_ATTEMPTS_PER_TICKET,
        ));
        let orders = Arc::new(OrderService::new(
            flaky.clone(),
            clock.clone(),
            notifier,
            engine,
        ));

        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider));
        registry.register(Arc::new(PayphoneProvider::new(
            Some("store-1".into()),
            Some("s3cret".into()),
        )));

        let processor = PaymentProcessor::new(
            flaky.clone(),
            clock,
            orders.clone(),
            Arc::new(registry),
            "http://localhost:8080",
        );
        Fixture {
            _temp: temp,
            store,
            flaky,
            orders,
            processor,
        }
    }

    fn pending_order(fx: &Fixture, quantity: i64) -> Order {
        let receipt = fx
            .orders
            .create_pending(CheckoutRequest {
                raffle_id: "r-1".to_string(),
                email: "buyer@example.com".to_string(),
                quantity,
                idempotency_key: None,
            })
            .unwrap();
        fx.store.get_order(&receipt.order_id).unwrap().unwrap()
    }

    fn payphone_delivery(payload: serde_json::Value, secret: &str) -> WebhookDelivery {
        let body = serde_json::to_vec(&payload).unwrap();
        let signature = sign(secret, &body).unwrap();
        WebhookDelivery::new(body).with_header("X-Signature", signature)
    }

    fn payphone(fx: &Fixture) -> Arc<dyn PaymentProvider> {
        fx.processor.registry().get("payphone").unwrap()
    }

    #[test]
    fn test_approved_payment_assigns_numbers() {
        let fx = fixture();
        let order = pending_order(&fx, 2);
        let delivery = payphone_delivery(
            json!({
                "ClientTransactionId": order.client_transaction_id,
                "TransactionId": 4001,
                "Amount": 600,
                "StatusCode": 3,
                "StoreId": "store-1"
            }),
            "s3cret",
        );

        let outcome = fx
            .processor
            .process_webhook(payphone(&fx).as_ref(), &delivery)
            .unwrap();

        let WebhookOutcome::Paid { numbers } = outcome else {
            panic!("expected paid, got {outcome:?}");
        };
        assert_eq!(numbers.len(), 2);
        let stored = fx.store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(stored.state, OrderState::Assigned);
        assert_eq!(stored.payment_intent_id.as_deref(), Some("4001"));
    }

    #[test]
    fn test_replayed_delivery_is_processed_once() {
        let fx = fixture();
        let order = pending_order(&fx, 1);
        let delivery = payphone_delivery(
            json!({
                "ClientTransactionId": order.client_transaction_id,
                "TransactionId": "tx-1",
                "Amount": 300,
                "StatusCode": 3,
                "StoreId": "store-1"
            }),
            "s3cret",
        );
        let provider = payphone(&fx);

        let first = fx.processor.process_webhook(provider.as_ref(), &delivery).unwrap();
        let second = fx.processor.process_webhook(provider.as_ref(), &delivery).unwrap();

        assert!(matches!(first, WebhookOutcome::Paid { .. }));
        assert_eq!(second, WebhookOutcome::Duplicate);
        assert_eq!(fx.store.count_webhook_events("tx-1").unwrap(), 1);
        assert_eq!(fx.store.count_assignments("r-1").unwrap(), 1);
    }

    #[test]
    fn test_failed_settlement_leaves_delivery_retryable() {
        let fx = fixture();
        let order = pending_order(&fx, 2);
        let delivery = payphone_delivery(
            json!({
                "ClientTransactionId": order.client_transaction_id,
                "TransactionId": "tx-9",
                "Amount": 600,
                "StatusCode": 3,
                "StoreId": "store-1"
            }),
            "s3cret",
        );

        fx.flaky.fail_next_commit.store(true, Ordering::SeqCst);
        let failed = fx.processor.acknowledge_webhook("payphone", &delivery).unwrap();

        assert_eq!(failed.status, 500);
        assert_eq!(failed.body["ErrorCode"], json!("INTERNAL_ERROR"));
        assert_eq!(fx.store.count_webhook_events("tx-9").unwrap(), 0);
        let stored = fx.store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(stored.state, OrderState::Pending);
        assert!(stored.payment_intent_id.is_none());

        let redelivered = fx.processor.acknowledge_webhook("payphone", &delivery).unwrap();

        assert_eq!(redelivered.status, 200);
        assert_eq!(redelivered.body["Response"], json!(true));
        assert_eq!(fx.store.count_webhook_events("tx-9").unwrap(), 1);
        assert_eq!(
            fx.store.get_order(&order.id).unwrap().unwrap().state,
            OrderState::Assigned
        );
        assert_eq!(fx.store.count_assignments("r-1").unwrap(), 2);
    }

    #[test]
    fn test_racing_deliveries_settle_once() {
        let fx = fixture();
        let order = pending_order(&fx, 2);
        let delivery = payphone_delivery(
            json!({
                "ClientTransactionId": order.client_transaction_id,
                "TransactionId": "tx-race",
                "Amount": 600,
                "StatusCode": 3,
                "StoreId": "store-1"
            }),
            "s3cret",
        );
        let provider = payphone(&fx);

        let outcomes: Vec<WebhookOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| s.spawn(|| fx.processor.process_webhook(provider.as_ref(), &delivery)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });

        let paid = outcomes
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::Paid { .. }))
            .count();
        assert_eq!(paid, 1);
        assert!(outcomes.contains(&WebhookOutcome::Duplicate));
        assert_eq!(fx.store.count_webhook_events("tx-race").unwrap(), 1);
        assert_eq!(fx.store.count_assignments("r-1").unwrap(), 2);
        assert_eq!(fx.store.get_raffle("r-1").unwrap().unwrap().stock_assigned, 2);
    }

    #[test]
    fn test_short_payment_cancels_order() {
        let fx = fixture();
        let order = pending_order(&fx, 2);
        let delivery = payphone_delivery(
            json!({
                "ClientTransactionId": order.client_transaction_id,
                "Amount": 500,
                "StatusCode": 3,
                "StoreId": "store-1"
            }),
            "s3cret",
        );

        let result = fx.processor.process_webhook(payphone(&fx).as_ref(), &delivery);

        assert!(matches!(
            result,
            Err(Error::AmountMismatch { reported: 500, .. })
        ));
        let stored = fx.store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(stored.state, OrderState::Cancelled);
        assert_eq!(fx.store.count_assignments("r-1").unwrap(), 0);
        assert_eq!(fx.store.get_raffle("r-1").unwrap().unwrap().stock_assigned, 0);
    }

    #[test]
    fn test_forged_callback_cannot_block_real_one() {
        let fx = fixture();
        let order = pending_order(&fx, 1);
        let payload = json!({
            "ClientTransactionId": order.client_transaction_id,
            "Amount": 300,
            "StatusCode": 3,
            "StoreId": "store-1"
        });
        let provider = payphone(&fx);

        let forged = fx
            .processor
            .process_webhook(provider.as_ref(), &payphone_delivery(payload.clone(), "guess"));
        assert!(matches!(forged, Err(Error::SignatureInvalid)));
        assert_eq!(
            fx.store.get_order(&order.id).unwrap().unwrap().state,
            OrderState::Pending
        );

        let genuine = fx
            .processor
            .process_webhook(provider.as_ref(), &payphone_delivery(payload.clone(), "s3cret"))
            .unwrap();
        assert!(matches!(genuine, WebhookOutcome::Paid { .. }));

        let replay = fx
            .processor
            .process_webhook(provider.as_ref(), &payphone_delivery(payload, "s3cret"))
            .unwrap();
        assert_eq!(replay, WebhookOutcome::Duplicate);
        assert_eq!(
            fx.store
                .count_webhook_events(&order.client_transaction_id)
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_orphan_and_declined_events_are_acknowledged() {
        let fx = fixture();
        let order = pending_order(&fx, 1);
        let fake = fx.processor.registry().get("fake").unwrap();

        let orphan = WebhookDelivery::new(r#"{"paymentIntentId":"pi_nobody","amount":300}"#);
        assert_eq!(
            fx.processor.process_webhook(fake.as_ref(), &orphan).unwrap(),
            WebhookOutcome::OrderNotFound
        );

        let declined = WebhookDelivery::new(
            json!({
                "clientTransactionId": order.client_transaction_id,
                "amount": 300,
                "status": "declined"
            })
            .to_string(),
        );
        assert_eq!(
            fx.processor.process_webhook(fake.as_ref(), &declined).unwrap(),
            WebhookOutcome::NotApproved
        );
        assert_eq!(
            fx.store.get_order(&order.id).unwrap().unwrap().state,
            OrderState::Pending
        );
    }

    #[test]
    fn test_missing_fields_and_envelope() {
        let fx = fixture();
        let delivery = payphone_delivery(json!({"StatusCode": 3}), "s3cret");

        let ack = fx.processor.acknowledge_webhook("payphone", &delivery).unwrap();

        assert_eq!(ack.status, 200);
        assert_eq!(ack.body["Response"], json!(false));
        assert_eq!(ack.body["ErrorCode"], json!("MISSING_FIELDS"));
        assert_eq!(fx.store.count_webhook_events("anything").unwrap(), 0);
        assert!(matches!(
            fx.processor.acknowledge_webhook("stripe", &delivery),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_fake_session_records_intent() {
        let fx = fixture();
        let order = pending_order(&fx, 2);

        let session = fx.processor.create_session("fake", &order.id).unwrap();

        assert_eq!(session.amount, 600);
        let intent = format!("fake_{}", order.id);
        assert_eq!(session.payment_intent_id.as_deref(), Some(intent.as_str()));
        assert!(session.checkout_url.unwrap().starts_with("http://localhost:8080/"));

        // The intent alone is enough to locate the order later.
        let delivery = WebhookDelivery::new(json!({"paymentIntentId": intent, "amount": 600}).to_string());
        let fake = fx.processor.registry().get("fake").unwrap();
        assert!(matches!(
            fx.processor.process_webhook(fake.as_ref(), &delivery).unwrap(),
            WebhookOutcome::Paid { .. }
        ));

        assert!(matches!(
            fx.processor.create_session("payphone", &order.id),
            Err(Error::InvalidState(_))
        ));
    }
}
