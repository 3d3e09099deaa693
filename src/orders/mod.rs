//! Order lifecycle: checkout, payment confirmation and ticket assignment.

mod assign;
mod draw;

pub use assign::{AssignmentEngine, AssignmentResult, DEFAULT_MAX_ATTEMPTS_PER_TICKET, StalledReport};
pub use draw::{RandomDraw, SeededDraw, TicketDraw};

use std::sync::Arc;

use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier, Template, send_best_effort};
use crate::store::{Store, StoreTx, in_transaction};
use crate::types::{Order, OrderState, RaffleState};

pub const CLIENT_TRANSACTION_ID_LEN: usize = 15;
const CLIENT_TRANSACTION_ID_ATTEMPTS: usize = 5;
const CLIENT_TRANSACTION_ID_SUFFIX: usize = 6;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub const MAX_QUANTITY: i64 = 1000;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;
const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub raffle_id: String,
    pub email: String,
    pub quantity: i64,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub idempotency_key: String,
    pub total: Decimal,
    pub client_transaction_id: String,
    /// False when an earlier order with the same key was returned.
    #[serde(skip)]
    pub created: bool,
}

impl CheckoutReceipt {
    fn from_order(order: &Order, created: bool) -> Self {
        Self {
            order_id: order.id.clone(),
            idempotency_key: order.idempotency_key.clone(),
            total: order.total,
            client_transaction_id: order.client_transaction_id.clone(),
            created,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub numbers: Vec<i64>,
}

pub struct OrderService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    assignments: Arc<AssignmentEngine>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        assignments: Arc<AssignmentEngine>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            assignments,
        }
    }

    pub fn assignments(&self) -> &AssignmentEngine {
        &self.assignments
    }

    /// Creates a pending order, or returns the order already created under the same key.
    ///
    /// Stock is only pre-checked here; the ledger is not touched until assignment.
    pub fn create_pending(&self, req: CheckoutRequest) -> Result<CheckoutReceipt> {
        let email = normalize_email(&req.email)?;
        validate_quantity(req.quantity)?;
        let idempotency_key = match req.idempotency_key {
            Some(key) => validate_idempotency_key(&key)?,
            None => Uuid::new_v4().to_string(),
        };

        if let Some(existing) = self.store.get_order_by_idempotency_key(&idempotency_key)? {
            return Ok(CheckoutReceipt::from_order(&existing, false));
        }

        let raffle = self
            .store
            .get_raffle(&req.raffle_id)?
            .filter(|r| r.state == RaffleState::Published)
            .ok_or(Error::NotFound)?;
        // Advisory only: nothing is reserved until assignment.
        let remaining = raffle.remaining();
        if req.quantity > remaining {
            return Err(Error::Conflict(format!(
                "requested {} tickets, remaining {remaining}",
                req.quantity
            )));
        }

        let now = self.clock.now();
        let mut order = Order {
            id: Uuid::new_v4().to_string(),
            raffle_id: raffle.id.clone(),
            buyer_email: email,
            quantity: req.quantity,
            total: raffle.unit_price * Decimal::from(req.quantity),
            state: OrderState::Pending,
            idempotency_key,
            client_transaction_id: self.generate_client_transaction_id()?,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        };

        for _ in 0..CLIENT_TRANSACTION_ID_ATTEMPTS {
            match self.store.create_order(&order) {
                Ok(()) => {
                    tracing::info!(
                        order_id = %order.id,
                        raffle_id = %order.raffle_id,
                        quantity = order.quantity,
                        "order created"
                    );
                    return Ok(CheckoutReceipt::from_order(&order, true));
                }
                Err(Error::AlreadyExists) => {
                    // Either a concurrent checkout with the same key won, or the
                    // transaction id collided.
                    if let Some(winner) = self
                        .store
                        .get_order_by_idempotency_key(&order.idempotency_key)?
                    {
                        return Ok(CheckoutReceipt::from_order(&winner, false));
                    }
                    order.client_transaction_id = self.generate_client_transaction_id()?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Conflict(
            "could not allocate a unique client transaction id".to_string(),
        ))
    }

    fn generate_client_transaction_id(&self) -> Result<String> {
        for _ in 0..CLIENT_TRANSACTION_ID_ATTEMPTS {
            let candidate = client_transaction_id(self.clock.now().timestamp_millis());
            if !self.store.client_transaction_id_exists(&candidate)? {
                return Ok(candidate);
            }
        }

        let mut fallback = Uuid::new_v4().simple().to_string();
        fallback.truncate(CLIENT_TRANSACTION_ID_LEN);
        Ok(fallback)
    }

    /// Moves a pending order to paid. Returns false if it was no longer pending.
    pub fn confirm_payment(&self, order: &Order, payment_intent_id: Option<&str>) -> Result<bool> {
        let paid = in_transaction(self.store.as_ref(), |tx| {
            self.confirm_payment_in(tx, &order.id, payment_intent_id)
        })?;
        if paid {
            self.announce_payment(order);
        }
        Ok(paid)
    }

    /// The transactional half of [`Self::confirm_payment`]. Callers that
    /// commit a paid transition this way send [`Self::announce_payment`]
    /// after the commit.
    pub fn confirm_payment_in(
        &self,
        tx: &dyn StoreTx,
        order_id: &str,
        payment_intent_id: Option<&str>,
    ) -> Result<bool> {
        let now = self.clock.now();
        if !tx.transition_order(order_id, OrderState::Pending, OrderState::Paid, now)? {
            return Ok(false);
        }

        if let Some(intent) = payment_intent_id {
            if !tx.set_order_payment_intent(order_id, intent, now)? {
                tracing::debug!(order_id, "payment intent already recorded");
            }
        }
        Ok(true)
    }

    pub fn announce_payment(&self, order: &Order) {
        tracing::info!(order_id = %order.id, "order paid");
        send_best_effort(
            self.notifier.as_ref(),
            Notification {
                template: Template::PaymentConfirmed,
                recipient: order.buyer_email.clone(),
                data: json!({
                    "total": order.total,
                    "quantity": order.quantity,
                }),
                order_id: Some(order.id.clone()),
            },
        );
    }

    /// Cancels a pending order. Returns false if it had already moved on.
    pub fn cancel(&self, order_id: &str) -> Result<bool> {
        in_transaction(self.store.as_ref(), |tx| self.cancel_in(tx, order_id))
    }

    pub fn cancel_in(&self, tx: &dyn StoreTx, order_id: &str) -> Result<bool> {
        let cancelled = tx.transition_order(
            order_id,
            OrderState::Pending,
            OrderState::Cancelled,
            self.clock.now(),
        )?;
        if cancelled {
            tracing::info!(order_id, "order cancelled");
        }
        Ok(cancelled)
    }

    /// Development shortcut that settles an order without a provider.
    pub fn mark_paid_manually(&self, order_id: &str) -> Result<AssignmentResult> {
        let order = self.store.get_order(order_id)?.ok_or(Error::NotFound)?;

        match order.state {
            OrderState::Pending => {
                let intent = format!("dev_{}", Uuid::new_v4().simple());
                self.confirm_payment(&order, Some(&intent))?;
            }
            OrderState::Paid | OrderState::Assigned => {}
            OrderState::Cancelled => {
                return Err(Error::InvalidState(format!("order {order_id} is cancelled")));
            }
        }

        self.assignments.assign(order_id)
    }

    pub fn order_detail(&self, order_id: &str) -> Result<OrderDetail> {
        let order = self.store.get_order(order_id)?.ok_or(Error::NotFound)?;
        let numbers = self.store.list_order_numbers(order_id)?;
        Ok(OrderDetail { order, numbers })
    }
}

/// Builds a short provider-facing id: base36 millis plus random base36, cut to 15 chars.
fn client_transaction_id(millis: i64) -> String {
    let mut id = to_base36(millis.max(0) as u64);
    let mut rng = rand::thread_rng();
    for _ in 0..CLIENT_TRANSACTION_ID_SUFFIX {
        id.push(BASE36[rng.gen_range(0..BASE36.len())] as char);
    }
    id.truncate(CLIENT_TRANSACTION_ID_LEN);
    id
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Trims and lower-cases an email, rejecting anything without a plausible shape.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err(Error::BadRequest("email cannot be empty".to_string()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(Error::BadRequest(format!(
            "email cannot exceed {MAX_EMAIL_LEN} characters"
        )));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(Error::BadRequest("email must contain '@'".to_string()));
    };
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(Error::BadRequest(format!("invalid email: {email}")));
    }

    Ok(email)
}

pub fn validate_quantity(quantity: i64) -> Result<()> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(Error::BadRequest(format!(
            "quantity must be between 1 and {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::BadRequest("idempotency key cannot be empty".to_string()));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(Error::BadRequest(format!(
            "idempotency key cannot exceed {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(Error::BadRequest(
            "idempotency key must be printable ASCII".to_string(),
        ));
    }
    Ok(key.to_string())
}
