use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a raffle. Only `Published` raffles accept checkouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleState {
    Draft,
    Published,
    SoldOut,
    Closed,
}

impl RaffleState {
    pub const fn as_str(self) -> &'static str {
        match self {
            RaffleState::Draft => "draft",
            RaffleState::Published => "published",
            RaffleState::SoldOut => "sold_out",
            RaffleState::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<RaffleState> {
        match s {
            "draft" => Some(RaffleState::Draft),
            "published" => Some(RaffleState::Published),
            "sold_out" => Some(RaffleState::SoldOut),
            "closed" => Some(RaffleState::Closed),
            _ => None,
        }
    }

    /// Whether an administrator may move a raffle from `self` to `next`.
    /// `SoldOut` is entered by the assignment engine, never by hand.
    #[must_use]
    pub fn can_transition_to(self, next: RaffleState) -> bool {
        matches!(
            (self, next),
            (RaffleState::Draft, RaffleState::Published)
                | (RaffleState::Published, RaffleState::Closed)
                | (RaffleState::SoldOut, RaffleState::Closed)
        ) || self == next
    }

    /// Publicly visible raffles.
    #[must_use]
    pub const fn is_listed(self) -> bool {
        !matches!(self, RaffleState::Draft)
    }
}

impl fmt::Display for RaffleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle: `pending -> paid -> assigned`, or `pending -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Paid,
    Assigned,
    Cancelled,
}

impl OrderState {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderState::Pending => "pending",
            OrderState::Paid => "paid",
            OrderState::Assigned => "assigned",
            OrderState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<OrderState> {
        match s {
            "pending" => Some(OrderState::Pending),
            "paid" => Some(OrderState::Paid),
            "assigned" => Some(OrderState::Assigned),
            "cancelled" => Some(OrderState::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: OrderState) -> bool {
        matches!(
            (self, next),
            (OrderState::Pending, OrderState::Paid)
                | (OrderState::Pending, OrderState::Cancelled)
                | (OrderState::Paid, OrderState::Assigned)
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
