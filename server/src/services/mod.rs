//! Oracle services: data source, ledger backends and the pipeline scheduler

pub mod ledger;
pub mod scheduler;
pub mod source;
