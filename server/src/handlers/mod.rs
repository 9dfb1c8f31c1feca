//! API handlers for the gauge oracle

pub mod admin;
pub mod status;

pub use admin::set_threshold;
pub use status::{get_status, health, ledger_readback, manual_update};
