use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};

pub async fn get_order(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.orders.order_detail(&id)?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Re-runs assignment for a paid order whose earlier attempt failed.
/// Already assigned orders return their existing numbers.
pub async fn assign_order(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.orders.assignments().assign(&id)?;
    Ok(Json(ApiResponse::success(result)))
}
