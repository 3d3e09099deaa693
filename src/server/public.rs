//! Unauthenticated buyer and provider endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};

use crate::orders::CheckoutRequest;
use crate::server::AppState;
use crate::server::dto::{
    CheckoutBody, MyNumbersLinkRequest, MyNumbersLinkResponse, MyNumbersQuery, SessionRequest,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::{idempotency_key, webhook_delivery};

const CHECKOUT_BUCKET: &str = "checkout:email";
const MY_NUMBERS_BUCKET: &str = "my-numbers:email";

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/raffles/{id}", get(get_raffle))
        .route("/checkout", post(checkout))
        .route("/payments/{provider}/session", post(create_session))
        .route("/webhooks/{provider}", post(webhook))
        .route("/my-numbers/link", post(my_numbers_link))
        .route("/my-numbers", get(my_numbers))
}

pub async fn get_raffle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let raffle = state.raffles.get_public(&id)?;
    Ok(Json(ApiResponse::success(raffle)))
}

pub async fn checkout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutBody>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = state.config.rate_limits.checkout;
    state
        .limiter
        .enforce(CHECKOUT_BUCKET, &req.email, limit.limit, limit.window_seconds)?;

    let receipt = state.orders.create_pending(CheckoutRequest {
        idempotency_key: idempotency_key(&headers, req.idempotency_key)?,
        raffle_id: req.raffle_id,
        email: req.email,
        quantity: req.quantity,
    })?;

    let status = if receipt.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(receipt))))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.payments.create_session(&provider, &req.order_id)?;
    Ok(Json(ApiResponse::success(session)))
}

/// Provider callback. The body is taken raw so signatures can be checked
/// over the exact bytes that were sent.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = webhook_delivery(&headers, &body);
    let ack = state.payments.acknowledge_webhook(&provider, &delivery)?;

    let status = StatusCode::from_u16(ack.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(ack.body)))
}

pub async fn my_numbers_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MyNumbersLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = state.config.rate_limits.my_numbers;
    state
        .limiter
        .enforce(MY_NUMBERS_BUCKET, &req.email, limit.limit, limit.window_seconds)?;

    state.recovery.request_link(&req.email)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(MyNumbersLinkResponse { sent: true })),
    ))
}

pub async fn my_numbers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MyNumbersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state.recovery.redeem(&query.token)?;
    Ok(Json(ApiResponse::success(orders)))
}
