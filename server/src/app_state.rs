//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::services::ledger::LedgerClient;
use crate::services::scheduler::Scheduler;
use crate::state::OracleState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, admin_token: Option<String>) -> Self {
        Self {
            scheduler,
            admin_token,
        }
    }
}

impl FromRef<AppState> for Arc<Scheduler> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.scheduler.clone()
    }
}

impl FromRef<AppState> for Arc<OracleState> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.scheduler.state().clone()
    }
}

impl FromRef<AppState> for Arc<LedgerClient> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.scheduler.ledger().clone()
    }
}
