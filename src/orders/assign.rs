use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::draw::TicketDraw;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier, Template, send_best_effort};
use crate::store::{Store, StoreTx, in_transaction};
use crate::types::{Assignment, Order, OrderState, RaffleState};

pub const DEFAULT_MAX_ATTEMPTS_PER_TICKET: u32 = 25;

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResult {
    pub order_id: String,
    /// Sorted ascending.
    pub numbers: Vec<i64>,
    /// False when the order had already been assigned by an earlier call.
    pub newly_assigned: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct StalledReport {
    pub assigned: Vec<String>,
    pub failed: Vec<(String, String)>,
}

enum Committed {
    Existing(Vec<i64>),
    Fresh {
        order: Order,
        raffle_title: String,
        numbers: Vec<i64>,
    },
}

/// Turns paid orders into unique ticket numbers.
///
/// Numbers are drawn uniformly from `1..=stock_total` and inserted against
/// the `(raffle, number)` unique key; a taken number is simply redrawn. Each
/// ticket gets a bounded number of draws, and running out aborts the whole
/// order so nothing partial is ever committed.
pub struct AssignmentEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    draw: Arc<dyn TicketDraw>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        draw: Arc<dyn TicketDraw>,
        notifier: Arc<dyn Notifier>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            clock,
            draw,
            notifier,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Allocates numbers for a paid order. Safe to call any number of times:
    /// an already assigned order returns its existing numbers untouched.
    pub fn assign(&self, order_id: &str) -> Result<AssignmentResult> {
        let now = self.clock.now();
        let committed =
            in_transaction(self.store.as_ref(), |tx| self.assign_in(tx, order_id, now))?;

        match committed {
            Committed::Existing(numbers) => Ok(AssignmentResult {
                order_id: order_id.to_string(),
                numbers,
                newly_assigned: false,
            }),
            Committed::Fresh {
                order,
                raffle_title,
                numbers,
            } => {
                tracing::info!(
                    order_id = %order.id,
                    raffle_id = %order.raffle_id,
                    count = numbers.len(),
                    "tickets assigned"
                );

                send_best_effort(
                    self.notifier.as_ref(),
                    Notification {
                        template: Template::NumbersAssigned,
                        recipient: order.buyer_email.clone(),
                        data: json!({
                            "raffle_title": raffle_title,
                            "numbers": numbers,
                        }),
                        order_id: Some(order.id.clone()),
                    },
                );

                Ok(AssignmentResult {
                    order_id: order.id,
                    numbers,
                    newly_assigned: true,
                })
            }
        }
    }

    fn assign_in(&self, tx: &dyn StoreTx, order_id: &str, now: DateTime<Utc>) -> Result<Committed> {
        let order = tx.get_order(order_id)?.ok_or(Error::NotFound)?;

        match order.state {
            OrderState::Assigned => return Ok(Committed::Existing(tx.list_order_numbers(order_id)?)),
            OrderState::Paid => {}
            other => {
                return Err(Error::InvalidState(format!(
                    "order {order_id} is {other}, assignment requires paid"
                )));
            }
        }

        let raffle = tx.get_raffle(&order.raffle_id)?.ok_or(Error::NotFound)?;
        let remaining = raffle.remaining();
        if order.quantity > remaining {
            return Err(Error::InsufficientStock {
                requested: order.quantity,
                remaining,
            });
        }

        let mut numbers = Vec::with_capacity(order.quantity as usize);
        for _ in 0..order.quantity {
            numbers.push(self.draw_free_number(tx, &order, raffle.stock_total, now)?);
        }

        tx.increment_stock_assigned(&raffle.id, order.quantity, now)?;
        if !tx.transition_order(&order.id, OrderState::Paid, OrderState::Assigned, now)? {
            return Err(Error::InvalidState(format!(
                "order {order_id} left paid during assignment"
            )));
        }

        if raffle.state == RaffleState::Published
            && raffle.stock_assigned + order.quantity == raffle.stock_total
        {
            tx.set_raffle_state(&raffle.id, RaffleState::SoldOut, now)?;
            tracing::info!(raffle_id = %raffle.id, "raffle sold out");
        }

        numbers.sort_unstable();
        Ok(Committed::Fresh {
            order,
            raffle_title: raffle.title,
            numbers,
        })
    }

    fn draw_free_number(
        &self,
        tx: &dyn StoreTx,
        order: &Order,
        stock_total: i64,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        for _ in 0..self.max_attempts {
            let number = self.draw.draw(stock_total);
            let inserted = tx.insert_assignment(&Assignment {
                order_id: order.id.clone(),
                raffle_id: order.raffle_id.clone(),
                number,
                created_at: now,
            })?;
            if inserted {
                return Ok(number);
            }
        }

        tracing::warn!(
            order_id = %order.id,
            attempts = self.max_attempts,
            "ticket draw budget exhausted"
        );
        Err(Error::AssignmentExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Re-runs assignment for every order stuck in `paid`.
    pub fn retry_stalled(&self) -> Result<StalledReport> {
        let mut report = StalledReport::default();

        for order in self.store.list_orders_by_state(OrderState::Paid)? {
            match self.assign(&order.id) {
                Ok(_) => report.assigned.push(order.id),
                Err(e) => {
                    tracing::error!(order_id = %order.id, "Assignment retry failed: {e}");
                    report.failed.push((order.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
