//! Route definitions for the gauge oracle API

use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::*;

// Status routes
pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/manual-update", post(manual_update))
        .route("/ledger", get(ledger_readback))
}

// Paths served by the previous Node bridge
pub fn legacy_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/flood-data", get(get_status))
        .route("/api/status", get(get_status))
        .route("/api/manual-update", post(manual_update))
}

// Admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/threshold", post(set_threshold))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(status_routes())
        .merge(legacy_routes())
        .merge(admin_routes())
        .with_state(state)
}
