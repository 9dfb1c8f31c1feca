//! Gauge Oracle Library
//!
//! Fetches river gauge readings, scales them to the ledger's fixed-point
//! encoding and pushes them to an EVM contract or an ICP canister.

pub mod app_state;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod units;

#[cfg(test)]
mod test_support;
