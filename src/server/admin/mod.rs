mod orders;
mod raffles;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // Raffle routes
        .route("/raffles", post(raffles::create_raffle))
        .route(
            "/raffles/{id}",
            get(raffles::get_raffle).patch(raffles::update_raffle),
        )
        // Order routes
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/assign", post(orders::assign_order))
}
