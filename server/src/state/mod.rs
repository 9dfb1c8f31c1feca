//! Last-known-good oracle snapshot
//!
//! The scheduler is the only writer. Readers get a cloned [`StatusResponse`]
//! and never hold the lock across I/O.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    FeedStatus, LedgerWriteStatus, Measurement, OracleStats, SiteInfo, StatusResponse,
    ThresholdInfo,
};
use crate::units::Scale;

#[derive(Debug)]
struct Snapshot {
    latest: Option<Measurement>,
    scaled: Option<i128>,
    ledger_write_status: LedgerWriteStatus,
    feed_status: FeedStatus,
    last_error: Option<String>,
    last_update: Option<DateTime<Utc>>,
    last_successful_write_at: Option<DateTime<Utc>>,
    next_scheduled_run_at: DateTime<Utc>,
    threshold: Option<i128>,
    ledger_value: Option<i128>,
    stats: OracleStats,
}

pub struct OracleState {
    provider_name: String,
    site_id: String,
    scale: Scale,
    inner: RwLock<Snapshot>,
}

impl OracleState {
    /// Fresh state: nothing fetched yet and ledger connectivity unknown.
    pub fn new(provider_name: impl Into<String>, site_id: impl Into<String>, scale: Scale) -> Self {
        Self {
            provider_name: provider_name.into(),
            site_id: site_id.into(),
            scale,
            inner: RwLock::new(Snapshot {
                latest: None,
                scaled: None,
                ledger_write_status: LedgerWriteStatus::Degraded,
                feed_status: FeedStatus::Initializing,
                last_error: None,
                last_update: None,
                last_successful_write_at: None,
                next_scheduled_run_at: Utc::now(),
                threshold: None,
                ledger_value: None,
                stats: OracleStats::default(),
            }),
        }
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub async fn snapshot(&self) -> StatusResponse {
        let inner = self.inner.read().await;

        let threshold = inner.threshold.map(|units| ThresholdInfo {
            threshold_feet: self.scale.to_feet(units),
            threshold_units: units,
        });
        let is_flood_condition = match (inner.scaled, inner.threshold) {
            (Some(scaled), Some(threshold)) => Some(scaled >= threshold),
            _ => None,
        };
        let site_info = SiteInfo {
            name: inner
                .latest
                .as_ref()
                .map(|m| m.source_name.clone())
                .unwrap_or_default(),
            site_id: inner
                .latest
                .as_ref()
                .map(|m| m.source_id.clone())
                .unwrap_or_else(|| self.site_id.clone()),
        };

        StatusResponse {
            value: inner.latest.as_ref().map(|m| m.value_feet),
            timestamp: inner.latest.as_ref().map(|m| m.observed_at),
            last_update: inner.last_update,
            status: inner.feed_status,
            error: inner.last_error.clone(),
            source: self.provider_name.clone(),
            site_info,
            threshold,
            scaled_value: inner.scaled,
            ledger_value: inner.ledger_value,
            ledger_write_status: inner.ledger_write_status,
            last_successful_write_at: inner.last_successful_write_at,
            next_scheduled_run_at: inner.next_scheduled_run_at,
            is_flood_condition,
            stats: inner.stats.clone(),
        }
    }

    pub async fn record_run_started(&self) {
        self.inner.write().await.stats.total_runs += 1;
    }

    pub async fn record_skipped_tick(&self) {
        self.inner.write().await.stats.skipped_ticks += 1;
    }

    /// Fetch or conversion failed. The previous reading stays in place.
    pub async fn record_fetch_failure(&self, error: String) {
        let mut inner = self.inner.write().await;
        inner.feed_status = FeedStatus::Error;
        inner.last_error = Some(error);
        inner.stats.failed_fetches += 1;
    }

    pub async fn record_measurement(&self, measurement: Measurement, scaled: i128) {
        let mut inner = self.inner.write().await;
        inner.latest = Some(measurement);
        inner.scaled = Some(scaled);
        inner.last_update = Some(Utc::now());
        inner.stats.successful_fetches += 1;
    }

    pub async fn record_write_success(&self) {
        let mut inner = self.inner.write().await;
        inner.ledger_write_status = LedgerWriteStatus::Ok;
        inner.feed_status = FeedStatus::Active;
        inner.last_error = None;
        inner.last_successful_write_at = Some(Utc::now());
        inner.stats.successful_writes += 1;
    }

    pub async fn record_write_failure(&self, error: String) {
        let mut inner = self.inner.write().await;
        inner.ledger_write_status = LedgerWriteStatus::Failed;
        inner.feed_status = FeedStatus::Partial;
        inner.last_error = Some(error);
        inner.stats.failed_writes += 1;
    }

    pub async fn record_threshold(&self, threshold: i128) {
        self.inner.write().await.threshold = Some(threshold);
    }

    pub async fn record_ledger_value(&self, value: i128) {
        self.inner.write().await.ledger_value = Some(value);
    }

    pub async fn schedule_next(&self, at: DateTime<Utc>) {
        self.inner.write().await.next_scheduled_run_at = at;
    }
}
