use axum::http::HeaderMap;

use crate::payments::WebhookDelivery;
use crate::server::response::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Picks the idempotency key, preferring the header over the body field.
pub fn idempotency_key(
    headers: &HeaderMap,
    body_key: Option<String>,
) -> Result<Option<String>, ApiError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| ApiError::bad_request("Idempotency-Key must be printable ASCII")),
        None => Ok(body_key),
    }
}

/// Captures a webhook exactly as received. Headers that are not valid text
/// are skipped; they can never carry a signature we would accept.
pub fn webhook_delivery(headers: &HeaderMap, body: &[u8]) -> WebhookDelivery {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .fold(WebhookDelivery::new(body), |delivery, (name, value)| {
            delivery.with_header(name, value)
        })
}
