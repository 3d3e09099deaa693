mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::*;

/// Store defines the database interface.
///
/// Single-statement operations live here. Anything that must read and then
/// write atomically goes through [`Store::transaction`] and a [`StoreTx`].
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Runs `f` inside one write transaction. Commits when `f` returns `Ok`,
    /// rolls back otherwise.
    fn transaction(&self, f: &mut dyn FnMut(&dyn StoreTx) -> Result<()>) -> Result<()>;

    // Raffle operations
    fn create_raffle(&self, raffle: &Raffle) -> Result<()>;
    fn get_raffle(&self, id: &str) -> Result<Option<Raffle>>;
    fn update_raffle(&self, raffle: &Raffle) -> Result<()>;

    // Order operations
    fn create_order(&self, order: &Order) -> Result<()>;
    fn get_order(&self, id: &str) -> Result<Option<Order>>;
    fn get_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>>;
    fn get_order_by_client_transaction_id(&self, id: &str) -> Result<Option<Order>>;
    fn get_order_by_payment_intent_id(&self, id: &str) -> Result<Option<Order>>;
    fn client_transaction_id_exists(&self, id: &str) -> Result<bool>;
    /// Conditional state change; returns false when the order was not in `from`.
    fn transition_order(
        &self,
        id: &str,
        from: OrderState,
        to: OrderState,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// Sets the payment intent only if none is recorded yet.
    fn set_order_payment_intent(
        &self,
        id: &str,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    fn list_orders_by_state(&self, state: OrderState) -> Result<Vec<Order>>;
    fn list_order_numbers(&self, order_id: &str) -> Result<Vec<i64>>;
    fn list_orders_with_numbers(
        &self,
        email: &str,
        states: &[OrderState],
    ) -> Result<Vec<OrderNumbers>>;
    fn count_assignments(&self, raffle_id: &str) -> Result<i64>;

    // Webhook journal
    /// Appends a journal row. Returns false if the correlation id is already journaled.
    fn record_webhook_event(&self, event: &WebhookEvent) -> Result<bool>;
    /// Replaces a row recorded with an invalid signature by a validly signed one.
    /// Returns false if no such unsigned row exists.
    fn upgrade_webhook_event(&self, event: &WebhookEvent) -> Result<bool>;
    fn get_webhook_event(&self, payment_intent_id: &str) -> Result<Option<WebhookEvent>>;
    fn count_webhook_events(&self, payment_intent_id: &str) -> Result<i64>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Recovery link operations
    fn create_recovery_token(&self, token: &RecoveryToken) -> Result<()>;
    fn get_recovery_token(&self, token_hash: &str) -> Result<Option<RecoveryToken>>;
    /// Marks an unused token used; returns false if it was already consumed.
    fn consume_recovery_token(&self, token_hash: &str) -> Result<bool>;
}

/// Operations available inside a [`Store::transaction`].
pub trait StoreTx {
    fn get_order(&self, id: &str) -> Result<Option<Order>>;
    fn get_order_by_client_transaction_id(&self, id: &str) -> Result<Option<Order>>;
    fn get_order_by_payment_intent_id(&self, id: &str) -> Result<Option<Order>>;
    fn get_raffle(&self, id: &str) -> Result<Option<Raffle>>;
    fn list_order_numbers(&self, order_id: &str) -> Result<Vec<i64>>;
    /// Inserts a ticket number. Returns false when the number is already taken
    /// for that raffle; the transaction stays usable.
    fn insert_assignment(&self, assignment: &Assignment) -> Result<bool>;
    /// Adds `quantity` to the raffle's assigned counter without ever passing `stock_total`.
    fn increment_stock_assigned(
        &self,
        raffle_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<()>;
    fn set_raffle_state(&self, raffle_id: &str, state: RaffleState, now: DateTime<Utc>)
    -> Result<()>;
    fn transition_order(
        &self,
        id: &str,
        from: OrderState,
        to: OrderState,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    fn set_order_payment_intent(
        &self,
        id: &str,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    fn record_webhook_event(&self, event: &WebhookEvent) -> Result<bool>;
    fn upgrade_webhook_event(&self, event: &WebhookEvent) -> Result<bool>;

    fn get_rate_limit(&self, bucket: &str, ident_hash: &str) -> Result<Option<RateLimitBucket>>;
    fn put_rate_limit(&self, bucket: &RateLimitBucket) -> Result<()>;
    fn increment_rate_limit(&self, bucket: &str, ident_hash: &str) -> Result<()>;
}

/// Runs `f` in a transaction and hands back its value.
pub fn in_transaction<T, F>(store: &dyn Store, f: F) -> Result<T>
where
    F: FnOnce(&dyn StoreTx) -> Result<T>,
{
    let mut f = Some(f);
    let mut out = None;
    store.transaction(&mut |tx| {
        let f = f.take().ok_or(Error::InvalidState(
            "transaction body invoked twice".to_string(),
        ))?;
        out = Some(f(tx)?);
        Ok(())
    })?;
    out.ok_or(Error::InvalidState(
        "transaction committed without a result".to_string(),
    ))
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
