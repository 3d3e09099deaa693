//! Raffle administration and the public raffle view.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Raffle, RaffleState};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_STOCK: i64 = 1_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewRaffle {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub stock_total: i64,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RaffleUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub stock_total: Option<i64>,
    pub state: Option<RaffleState>,
}

/// What buyers see about a raffle.
#[derive(Debug, Clone, Serialize)]
pub struct PublicRaffle {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub stock_total: i64,
    pub stock_assigned: i64,
    pub remaining: i64,
    pub state: RaffleState,
}

impl From<Raffle> for PublicRaffle {
    fn from(r: Raffle) -> Self {
        Self {
            remaining: r.remaining(),
            id: r.id,
            title: r.title,
            description: r.description,
            unit_price: r.unit_price,
            stock_total: r.stock_total,
            stock_assigned: r.stock_assigned,
            state: r.state,
        }
    }
}

pub struct RaffleService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RaffleService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates a raffle in `draft`.
    pub fn create(&self, input: NewRaffle) -> Result<Raffle> {
        let title = validate_title(&input.title)?;
        let description = validate_description(input.description)?;
        validate_price(input.unit_price)?;
        validate_stock(input.stock_total)?;

        let now = self.clock.now();
        let raffle = Raffle {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            unit_price: input.unit_price,
            stock_total: input.stock_total,
            stock_assigned: 0,
            state: RaffleState::Draft,
            created_at: now,
            updated_at: now,
        };
        self.store.create_raffle(&raffle)?;

        tracing::info!(raffle_id = %raffle.id, stock_total = raffle.stock_total, "raffle created");
        Ok(raffle)
    }

    pub fn update(&self, id: &str, update: RaffleUpdate) -> Result<Raffle> {
        let mut raffle = self.store.get_raffle(id)?.ok_or(Error::NotFound)?;

        if let Some(title) = update.title {
            raffle.title = validate_title(&title)?;
        }
        if update.description.is_some() {
            raffle.description = validate_description(update.description)?;
        }
        if let Some(price) = update.unit_price {
            validate_price(price)?;
            raffle.unit_price = price;
        }
        if let Some(stock_total) = update.stock_total {
            validate_stock(stock_total)?;
            if stock_total != raffle.stock_total && raffle.stock_assigned > 0 {
                return Err(Error::Conflict(format!(
                    "stock_total is fixed once tickets are assigned ({} so far)",
                    raffle.stock_assigned
                )));
            }
            raffle.stock_total = stock_total;
        }
        if let Some(state) = update.state {
            if !raffle.state.can_transition_to(state) {
                return Err(Error::InvalidState(format!(
                    "raffle cannot move from {} to {state}",
                    raffle.state
                )));
            }
            raffle.state = state;
        }

        raffle.updated_at = self.clock.now();
        self.store.update_raffle(&raffle).map_err(|e| match e {
            // The guard on stock_assigned failed after our read.
            Error::NotFound => Error::Conflict("raffle changed concurrently".to_string()),
            other => other,
        })?;

        tracing::info!(raffle_id = %raffle.id, state = %raffle.state, "raffle updated");
        Ok(raffle)
    }

    /// Public view; drafts are hidden.
    pub fn get_public(&self, id: &str) -> Result<PublicRaffle> {
        self.store
            .get_raffle(id)?
            .filter(|r| r.state.is_listed())
            .map(PublicRaffle::from)
            .ok_or(Error::NotFound)
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::BadRequest("title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::BadRequest(format!(
            "title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: Option<String>) -> Result<Option<String>> {
    let Some(description) = description else {
        return Ok(None);
    };
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(Error::BadRequest(format!(
            "description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

fn validate_price(price: Decimal) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(Error::BadRequest("unit_price must be positive".to_string()));
    }
    if price.round_dp(2) != price {
        return Err(Error::BadRequest(
            "unit_price cannot have more than 2 decimal places".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock(stock_total: i64) -> Result<()> {
    if !(1..=MAX_STOCK).contains(&stock_total) {
        return Err(Error::BadRequest(format!(
            "stock_total must be between 1 and {MAX_STOCK}"
        )));
    }
    Ok(())
}
