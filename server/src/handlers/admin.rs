use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use validator::Validate;

use crate::app_state::AppState;
use crate::error::SchedulerError;
use crate::models::{ApiResponse, SetThresholdRequest, ThresholdInfo};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

type AdminResult = (StatusCode, Json<ApiResponse<ThresholdInfo>>);

fn failure(status: StatusCode, message: impl Into<String>) -> AdminResult {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

/// Administrative threshold write
pub async fn set_threshold(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SetThresholdRequest>,
) -> AdminResult {
    let Some(expected) = app_state.admin_token.as_deref() else {
        return failure(StatusCode::NOT_FOUND, "Admin API is not configured");
    };

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return failure(StatusCode::FORBIDDEN, "Invalid admin token");
    }

    if let Err(e) = payload.validate() {
        return failure(StatusCode::BAD_REQUEST, format!("Validation error: {}", e));
    }

    let ledger = app_state.scheduler.ledger();
    let units = match ledger.scale().to_scaled(payload.threshold_feet) {
        Ok(units) => units,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match app_state.scheduler.set_threshold(units).await {
        Ok(receipt) => {
            tracing::info!(
                threshold_feet = payload.threshold_feet,
                reference = %receipt.reference,
                "flood threshold updated"
            );
            (
                StatusCode::OK,
                Json(ApiResponse {
                    success: true,
                    data: Some(ThresholdInfo {
                        threshold_feet: ledger.scale().to_feet(units),
                        threshold_units: units,
                    }),
                    error: None,
                }),
            )
        }
        Err(e @ SchedulerError::RunAlreadyInProgress) => {
            tracing::warn!(error = %e, "threshold update rejected");
            failure(StatusCode::CONFLICT, e.to_string())
        }
        Err(SchedulerError::Ledger(e)) => {
            tracing::error!(error = %e, "failed to update flood threshold");
            failure(StatusCode::BAD_GATEWAY, format!("Threshold update failed: {}", e))
        }
    }
}
