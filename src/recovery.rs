//! "Recover my numbers": emailed one-time links that list a buyer's tickets.

use std::sync::Arc;

use chrono::Duration;
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier, Template, send_best_effort};
use crate::orders::normalize_email;
use crate::store::Store;
use crate::types::{OrderNumbers, OrderState, RecoveryToken};

const TOKEN_BYTES: usize = 32;
pub const LINK_TTL_MINUTES: i64 = 30;

pub struct RecoveryService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    public_base_url: String,
}

impl RecoveryService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            public_base_url: public_base_url.into(),
        }
    }

    /// Issues a link for `email`. The answer is the same whether or not the
    /// address has any orders.
    pub fn request_link(&self, email: &str) -> Result<()> {
        let email = normalize_email(email)?;

        let mut raw = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = hex::encode(raw);

        let now = self.clock.now();
        let expires_at = now + Duration::minutes(LINK_TTL_MINUTES);
        self.store.create_recovery_token(&RecoveryToken {
            token_hash: hash_token(&token),
            email: email.clone(),
            expires_at,
            used: false,
            created_at: now,
        })?;

        let url = format!(
            "{}/my-numbers?token={token}",
            self.public_base_url.trim_end_matches('/')
        );
        send_best_effort(
            self.notifier.as_ref(),
            Notification {
                template: Template::MyNumbersLink,
                recipient: email,
                data: json!({
                    "url": url,
                    "expires_at": expires_at,
                }),
                order_id: None,
            },
        );
        Ok(())
    }

    /// Redeems a link token once and returns the buyer's paid and assigned
    /// orders, newest first.
    pub fn redeem(&self, token: &str) -> Result<Vec<OrderNumbers>> {
        let token_hash = hash_token(token.trim());
        let record = self
            .store
            .get_recovery_token(&token_hash)?
            .ok_or(Error::Unauthorized)?;

        if record.used {
            return Err(Error::Unauthorized);
        }
        if record.expires_at <= self.clock.now() {
            return Err(Error::TokenExpired);
        }
        if !self.store.consume_recovery_token(&token_hash)? {
            return Err(Error::Unauthorized);
        }

        self.store
            .list_orders_with_numbers(&record.email, &[OrderState::Paid, OrderState::Assigned])
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SqliteStore;
    use crate::types::{Order, Raffle, RaffleState};

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Notification>>);

    impl Notifier for Outbox {
        fn send(&self, notification: &Notification) -> Result<()> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    impl Outbox {
        fn last_token(&self) -> String {
            let sent = self.0.lock().unwrap();
            let url = sent.last().unwrap().data["url"].as_str().unwrap().to_string();
            url.split("token=").nth(1).unwrap().to_string()
        }
    }

    fn setup() -> (TempDir, Arc<SqliteStore>, Arc<ManualClock>, Arc<Outbox>, RecoveryService) {
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

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let outbox = Arc::new(Outbox::default());
        let service = RecoveryService::new(
            store.clone(),
            clock.clone(),
            outbox.clone(),
            "https://tickets.example.com/",
        );
        (temp, store, clock, outbox, service)
    }

    fn order(store: &SqliteStore, id: &str, email: &str, state: OrderState) {
        store
            .create_order(&Order {
                id: id.to_string(),
                raffle_id: "r-1".to_string(),
                buyer_email: email.to_string(),
                quantity: 1,
                total: Decimal::new(300, 2),
                state: OrderState::Pending,
                idempotency_key: format!("key-{id}"),
                client_transaction_id: format!("ctx-{id}"),
                payment_intent_id: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        if state != OrderState::Pending {
            store
                .transition_order(id, OrderState::Pending, state, Utc::now())
                .unwrap();
        }
    }

    #[test]
    fn test_link_is_single_use() {
        let (_temp, store, _clock, outbox, service) = setup();
        order(&store, "o-paid", "buyer@example.com", OrderState::Paid);
        order(&store, "o-pending", "buyer@example.com", OrderState::Pending);
        order(&store, "o-other", "someone@example.com", OrderState::Paid);

        service.request_link(" Buyer@Example.com").unwrap();
        let token = outbox.last_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(
            outbox.0.lock().unwrap()[0].data["url"]
                .as_str()
                .unwrap()
                .starts_with("https://tickets.example.com/my-numbers?token=")
        );

        let orders = service.redeem(&token).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "o-paid");
        assert_eq!(orders[0].raffle_title, "Motorbike");

        assert!(matches!(service.redeem(&token), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_only_hash_is_stored() {
        let (_temp, store, _clock, outbox, service) = setup();

        service.request_link("buyer@example.com").unwrap();
        let token = outbox.last_token();

        assert!(store.get_recovery_token(&token).unwrap().is_none());
        assert!(store.get_recovery_token(&hash_token(&token)).unwrap().is_some());
    }

    #[test]
    fn test_expired_link_rejected() {
        let (_temp, _store, clock, outbox, service) = setup();

        service.request_link("buyer@example.com").unwrap();
        let token = outbox.last_token();
        clock.advance(Duration::minutes(LINK_TTL_MINUTES));

        assert!(matches!(service.redeem(&token), Err(Error::TokenExpired)));
        assert!(matches!(service.redeem("garbage"), Err(Error::Unauthorized)));
    }
}
