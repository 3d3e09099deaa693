use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub raffle_id: String,
    pub email: String,
    pub quantity: i64,
    /// Used when no `Idempotency-Key` header is sent.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MyNumbersLinkRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MyNumbersLinkResponse {
    pub sent: bool,
}

#[derive(Debug, Deserialize)]
pub struct MyNumbersQuery {
    pub token: String,
}
