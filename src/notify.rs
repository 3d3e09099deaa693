//! Outbound buyer notifications.
//!
//! The core only decides *when* a buyer is told something. Rendering and
//! delivery belong to whatever [`Notifier`] is plugged in.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    PaymentConfirmed,
    NumbersAssigned,
    MyNumbersLink,
}

impl Template {
    pub const fn as_str(self) -> &'static str {
        match self {
            Template::PaymentConfirmed => "payment_confirmed",
            Template::NumbersAssigned => "numbers_assigned",
            Template::MyNumbersLink => "my_numbers_link",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub template: Template,
    pub recipient: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            template = notification.template.as_str(),
            recipient = %notification.recipient,
            order_id = notification.order_id.as_deref().unwrap_or("-"),
            data = %notification.data,
            "notification queued"
        );
        Ok(())
    }
}

/// Sends without letting a delivery failure escape.
pub fn send_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.send(&notification) {
        tracing::warn!(
            template = notification.template.as_str(),
            order_id = notification.order_id.as_deref().unwrap_or("-"),
            "Failed to send notification: {e}"
        );
    }
}
