//! Error taxonomy for the oracle bridge
//!
//! Fetch and conversion errors leave the off-chain reading untouched, ledger
//! errors only abort the write stage. Nothing here is fatal except
//! [`ConfigError`] at startup.

use thiserror::Error;

/// Failures while pulling a reading from the time-series provider.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("malformed data source response: {0}")]
    MalformedResponse(String),

    #[error("unparsable measurement value: {0:?}")]
    UnparsableValue(String),
}

/// Failures converting between feet and the ledger's fixed-point encoding.
#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),
}

/// Failures talking to the configured ledger backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("ledger rejected call: {0}")]
    WriteRejected(String),

    #[error("ledger write not confirmed within {0}s")]
    WriteTimeout(u64),

    #[error("unexpected ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    pub fn is_connection(&self) -> bool {
        matches!(self, LedgerError::ConnectionUnavailable(_))
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::ConnectionUnavailable(err.to_string())
    }
}

/// Errors surfaced by the pipeline runner itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("RunAlreadyInProgress")]
    RunAlreadyInProgress,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Startup configuration problems. These abort the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
