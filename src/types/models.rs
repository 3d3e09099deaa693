use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderState, RaffleState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raffle {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub stock_total: i64,
    pub stock_assigned: i64,
    pub state: RaffleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Raffle {
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.stock_total - self.stock_assigned
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub raffle_id: String,
    pub buyer_email: String,
    pub quantity: i64,
    /// `unit_price * quantity` at creation time, never recomputed.
    pub total: Decimal,
    pub state: OrderState,
    pub idempotency_key: String,
    pub client_transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub order_id: String,
    pub raffle_id: String,
    pub number: i64,
    pub created_at: DateTime<Utc>,
}

/// One row of the append-only payment notification journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: String,
    pub payment_intent_id: String,
    pub signature_valid: bool,
    pub payload: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitBucket {
    pub bucket: String,
    pub ident_hash: String,
    pub count: i64,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// One-time link token for looking up a buyer's numbers. Only the hash is stored.
#[derive(Debug, Clone)]
pub struct RecoveryToken {
    pub token_hash: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderNumbers {
    pub order_id: String,
    pub raffle_id: String,
    pub raffle_title: String,
    pub quantity: i64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub numbers: Vec<i64>,
}
