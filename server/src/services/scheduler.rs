//! Fetch -> convert -> write pipeline and its timer loop

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{LedgerError, SchedulerError};
use crate::models::{StatusResponse, WriteReceipt};
use crate::services::ledger::LedgerClient;
use crate::services::source::MeasurementSource;
use crate::state::OracleState;

/// How a single pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Fresh reading stored, ledger write failed.
    DegradedWrite,
    /// Fetch or conversion failed, nothing stored.
    Failed,
}

pub struct Scheduler {
    source: Arc<dyn MeasurementSource>,
    ledger: Arc<LedgerClient>,
    state: Arc<OracleState>,
    interval: Duration,
    run_guard: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        ledger: Arc<LedgerClient>,
        state: Arc<OracleState>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            ledger,
            state,
            interval,
            run_guard: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<OracleState> {
        &self.state
    }

    pub fn ledger(&self) -> &Arc<LedgerClient> {
        &self.ledger
    }

    /// Run the pipeline now and return the resulting snapshot.
    pub async fn run_now(&self) -> Result<StatusResponse, SchedulerError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| SchedulerError::RunAlreadyInProgress)?;

        self.run_pipeline("manual").await;
        Ok(self.state.snapshot().await)
    }

    /// Write a new flood threshold under the run guard, so it never interleaves
    /// with a pipeline write.
    pub async fn set_threshold(&self, units: i128) -> Result<WriteReceipt, SchedulerError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| SchedulerError::RunAlreadyInProgress)?;

        self.ledger.ensure_connected().await?;
        let receipt = self.ledger.write_threshold(units).await?;
        self.state.record_threshold(units).await;
        Ok(receipt)
    }

    /// Tick until `shutdown` flips to true. The first tick fires immediately.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            backend = self.ledger.backend_name(),
            "oracle scheduler started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.run_guard.try_lock() {
                Ok(_guard) => {
                    self.run_pipeline("timer").await;
                }
                Err(_) => {
                    warn!("previous run still in progress; skipping tick");
                    self.state.record_skipped_tick().await;
                }
            }
        }

        info!("oracle scheduler stopped");
    }

    async fn run_pipeline(&self, trigger: &'static str) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, trigger);

        async {
            self.state.record_run_started().await;
            let outcome = self.execute().await;
            self.state
                .schedule_next(next_run_after(Utc::now(), self.interval))
                .await;
            info!(?outcome, "pipeline run finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(&self) -> RunOutcome {
        let measurement = match self.source.fetch_latest().await {
            Ok(measurement) => measurement,
            Err(err) => {
                error!(error = %err, "failed to fetch gauge reading");
                self.state
                    .record_fetch_failure(format!("Failed to fetch data: {err}"))
                    .await;
                return RunOutcome::Failed;
            }
        };

        let scaled = match self.ledger.scale().to_scaled(measurement.value_feet) {
            Ok(scaled) => scaled,
            Err(err) => {
                error!(error = %err, value_feet = measurement.value_feet, "reading rejected");
                self.state
                    .record_fetch_failure(format!("Failed to convert reading: {err}"))
                    .await;
                return RunOutcome::Failed;
            }
        };

        info!(value_feet = measurement.value_feet, scaled = %scaled, "reading converted");
        self.state.record_measurement(measurement, scaled).await;

        match self.write(scaled).await {
            Ok(receipt) => {
                info!(reference = %receipt.reference, block = ?receipt.block, "ledger updated");
                self.state.record_write_success().await;
                self.refresh_ledger_view().await;
                RunOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "ledger write failed; serving off-chain reading");
                self.state
                    .record_write_failure(format!("Oracle update failed: {err}"))
                    .await;
                RunOutcome::DegradedWrite
            }
        }
    }

    async fn write(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        self.ledger.ensure_connected().await?;
        self.ledger.write_scaled_value(scaled).await
    }

    /// Cache threshold and on-ledger value. Failures never change the run outcome.
    async fn refresh_ledger_view(&self) {
        match self.ledger.read_threshold().await {
            Ok(threshold) => self.state.record_threshold(threshold).await,
            Err(err) => warn!(error = %err, "could not read ledger threshold"),
        }

        match self.ledger.read_current_value().await {
            Ok(value) => self.state.record_ledger_value(value).await,
            Err(err) => warn!(error = %err, "could not read back ledger value"),
        }
    }
}

fn next_run_after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|step| now.checked_add_signed(step))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
