use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::models::{HealthResponse, LedgerReadback, ManualUpdateResponse, StatusResponse, ThresholdInfo};
use crate::services::ledger::LedgerClient;
use crate::services::scheduler::Scheduler;
use crate::state::OracleState;

/// Process liveness only
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Gauge oracle bridge is running",
        timestamp: Utc::now(),
    })
}

/// Last-known-good snapshot. Never touches the ledger.
pub async fn get_status(State(state): State<Arc<OracleState>>) -> Json<StatusResponse> {
    Json(state.snapshot().await)
}

/// Run the pipeline now
pub async fn manual_update(
    State(scheduler): State<Arc<Scheduler>>,
) -> (StatusCode, Json<ManualUpdateResponse>) {
    match scheduler.run_now().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ManualUpdateResponse {
                success: true,
                error: None,
                snapshot: Some(snapshot),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "manual update rejected");
            (
                StatusCode::CONFLICT,
                Json(ManualUpdateResponse {
                    success: false,
                    error: Some(e.to_string()),
                    snapshot: None,
                }),
            )
        }
    }
}

/// Read the value and threshold straight from the ledger
pub async fn ledger_readback(
    State(ledger): State<Arc<LedgerClient>>,
    State(state): State<Arc<OracleState>>,
) -> Json<LedgerReadback> {
    let scale = ledger.scale();
    let backend = ledger.backend_name();

    if let Err(e) = ledger.ensure_connected().await {
        return Json(LedgerReadback {
            backend,
            available: false,
            ledger_value: None,
            ledger_value_feet: None,
            threshold: None,
            error: Some(e.to_string()),
        });
    }

    let value = ledger.read_current_value().await;
    let threshold = ledger.read_threshold().await;

    if let Ok(units) = threshold {
        state.record_threshold(units).await;
    }
    if let Ok(units) = value {
        state.record_ledger_value(units).await;
    }

    let error = match (&value, &threshold) {
        (Err(e), _) | (_, Err(e)) => Some(e.to_string()),
        _ => None,
    };

    Json(LedgerReadback {
        backend,
        available: value.is_ok() || threshold.is_ok(),
        ledger_value: value.as_ref().ok().copied(),
        ledger_value_feet: value.as_ref().ok().map(|units| scale.to_feet(*units)),
        threshold: threshold.as_ref().ok().map(|units| ThresholdInfo {
            threshold_feet: scale.to_feet(*units),
            threshold_units: *units,
        }),
        error,
    })
}
