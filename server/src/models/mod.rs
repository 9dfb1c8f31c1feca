//! Data models for the gauge oracle bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub mod usgs;

/// One gauge reading as returned by the data source. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub value_feet: f64,
    pub observed_at: DateTime<Utc>,
    pub source_name: String,
    pub source_id: String,
}

/// Outcome of the most recent attempt to push a value to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerWriteStatus {
    Ok,
    Degraded,
    Failed,
}

/// Coarse feed health reported to dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Initializing,
    Active,
    Partial,
    Error,
}

/// Confirmation data for an accepted ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    /// Transaction hash or request id, hex encoded.
    pub reference: String,
    pub block: Option<u64>,
}

/// Generic API envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub name: String,
    pub site_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdInfo {
    pub threshold_feet: f64,
    pub threshold_units: i128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleStats {
    pub total_runs: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub successful_writes: u64,
    pub failed_writes: u64,
    pub skipped_ticks: u64,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub status: FeedStatus,
    pub error: Option<String>,
    pub source: String,
    pub site_info: SiteInfo,
    pub threshold: Option<ThresholdInfo>,
    pub scaled_value: Option<i128>,
    /// Last value read back from the ledger after a write.
    pub ledger_value: Option<i128>,
    pub ledger_write_status: LedgerWriteStatus,
    pub last_successful_write_at: Option<DateTime<Utc>>,
    pub next_scheduled_run_at: DateTime<Utc>,
    pub is_flood_condition: Option<bool>,
    pub stats: OracleStats,
}

/// Body of `POST /manual-update`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualUpdateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub snapshot: Option<StatusResponse>,
}

/// Body of `GET /ledger`, read live from the backend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReadback {
    pub backend: &'static str,
    pub available: bool,
    pub ledger_value: Option<i128>,
    pub ledger_value_feet: Option<f64>,
    pub threshold: Option<ThresholdInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetThresholdRequest {
    #[validate(custom = "validate_positive_feet")]
    pub threshold_feet: f64,
}

fn validate_positive_feet(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new("threshold_must_be_positive"))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}
