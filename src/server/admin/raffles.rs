use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::error::Error;
use crate::raffles::{NewRaffle, RaffleUpdate};
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_raffle(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewRaffle>,
) -> Result<impl IntoResponse, ApiError> {
    let raffle = state.raffles.create(req)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(raffle))))
}

/// Full record, drafts included.
pub async fn get_raffle(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let raffle = state.store.get_raffle(&id)?.ok_or(Error::NotFound)?;
    Ok(Json(ApiResponse::success(raffle)))
}

pub async fn update_raffle(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RaffleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let raffle = state.raffles.update(&id, req)?;
    Ok(Json(ApiResponse::success(raffle)))
}
