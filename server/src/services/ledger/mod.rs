//! Ledger client: one write/read surface over swappable backends
//!
//! The [`LedgerClient`] owns the live [`LedgerConnection`] handle. A handle is
//! never mutated; reconnecting builds a new one through the configured
//! [`LedgerBackend`], and the cached handle is replaced only once the new one
//! has answered a health check.

pub mod canister;
pub mod evm;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{LedgerBackendKind, LedgerConfig};
use crate::error::LedgerError;
use crate::models::WriteReceipt;
use crate::units::Scale;

/// Factory for ledger handles. Implementations must verify the handle before returning it.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<Arc<dyn LedgerConnection>, LedgerError>;
}

/// A verified, immutable handle to one ledger endpoint.
#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// Cheap read used to check the endpoint still answers.
    async fn health_check(&self) -> Result<(), LedgerError>;

    /// Submit a scaled reading and wait for confirmation.
    async fn write_value(&self, scaled: i128) -> Result<WriteReceipt, LedgerError>;

    async fn read_value(&self) -> Result<i128, LedgerError>;

    async fn read_threshold(&self) -> Result<i128, LedgerError>;

    async fn write_threshold(&self, scaled: i128) -> Result<WriteReceipt, LedgerError>;
}

#[derive(Default)]
struct ConnectionSlot {
    handle: Option<Arc<dyn LedgerConnection>>,
    stale: bool,
}

pub struct LedgerClient {
    backend: Box<dyn LedgerBackend>,
    scale: Scale,
    connect_timeout: Duration,
    write_timeout: Duration,
    slot: Mutex<ConnectionSlot>,
    connecting: Mutex<()>,
}

impl LedgerClient {
    pub fn new(
        backend: Box<dyn LedgerBackend>,
        scale: Scale,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            scale,
            connect_timeout,
            write_timeout,
            slot: Mutex::new(ConnectionSlot::default()),
            connecting: Mutex::new(()),
        }
    }

    /// Build the client for whichever backend the configuration selects.
    pub fn from_config(config: &LedgerConfig) -> anyhow::Result<Self> {
        let backend: Box<dyn LedgerBackend> = match config.backend {
            LedgerBackendKind::Contract => {
                let contract = config
                    .contract
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("contract backend selected without contract config"))?;
                Box::new(evm::EvmBackend::new(
                    contract.clone(),
                    config.connect_timeout,
                    config.write_timeout,
                )?)
            }
            LedgerBackendKind::Canister => {
                let canister = config
                    .canister
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("canister backend selected without canister config"))?;
                Box::new(canister::CanisterBackend::new(
                    canister.clone(),
                    config.network,
                    config.scale,
                    config.connect_timeout,
                    config.write_timeout,
                )?)
            }
        };

        Ok(Self::new(
            backend,
            config.scale,
            config.connect_timeout,
            config.write_timeout,
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Make sure a verified handle is cached. Idempotent while the handle is healthy.
    ///
    /// The slot lock is never held across the handshake; readers keep seeing the
    /// old state until the verified handle is swapped in.
    pub async fn ensure_connected(&self) -> Result<(), LedgerError> {
        if self.is_connected().await {
            return Ok(());
        }

        // one handshake at a time
        let _connecting = self.connecting.lock().await;
        if self.is_connected().await {
            return Ok(());
        }

        debug!(backend = self.backend.name(), "establishing ledger connection");
        let fresh = match timeout(self.connect_timeout, self.backend.connect()).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::ConnectionUnavailable(format!(
                "connect timed out after {}s",
                self.connect_timeout.as_secs()
            ))),
        };

        match fresh {
            Ok(handle) => {
                let mut slot = self.slot.lock().await;
                slot.handle = Some(handle);
                slot.stale = false;
                drop(slot);
                info!(backend = self.backend.name(), "ledger connection established");
                Ok(())
            }
            Err(err) => {
                warn!(backend = self.backend.name(), error = %err, "ledger connection failed");
                Err(err)
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        let slot = self.slot.lock().await;
        slot.handle.is_some() && !slot.stale
    }

    pub async fn write_scaled_value(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        let handle = self.live_handle().await?;
        let result = match timeout(self.write_timeout, handle.write_value(scaled)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::WriteTimeout(self.write_timeout.as_secs())),
        };
        self.observe(&handle, &result).await;
        result
    }

    pub async fn write_threshold(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        let handle = self.live_handle().await?;
        let result = match timeout(self.write_timeout, handle.write_threshold(scaled)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::WriteTimeout(self.write_timeout.as_secs())),
        };
        self.observe(&handle, &result).await;
        result
    }

    pub async fn read_threshold(&self) -> Result<i128, LedgerError> {
        let handle = self.live_handle().await?;
        let result = self.bounded_read(handle.read_threshold()).await;
        self.observe(&handle, &result).await;
        result
    }

    pub async fn read_current_value(&self) -> Result<i128, LedgerError> {
        let handle = self.live_handle().await?;
        let result = self.bounded_read(handle.read_value()).await;
        self.observe(&handle, &result).await;
        result
    }

    async fn bounded_read<F>(&self, read: F) -> Result<i128, LedgerError>
    where
        F: std::future::Future<Output = Result<i128, LedgerError>>,
    {
        match timeout(self.connect_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::ConnectionUnavailable(format!(
                "read timed out after {}s",
                self.connect_timeout.as_secs()
            ))),
        }
    }

    async fn live_handle(&self) -> Result<Arc<dyn LedgerConnection>, LedgerError> {
        let slot = self.slot.lock().await;
        match (&slot.handle, slot.stale) {
            (Some(handle), false) => Ok(handle.clone()),
            _ => Err(LedgerError::ConnectionUnavailable(
                "no verified ledger connection".to_string(),
            )),
        }
    }

    /// A connection failure means the next `ensure_connected` must handshake again.
    /// Failures reported by a handle that has since been replaced are ignored.
    async fn observe<T>(&self, used: &Arc<dyn LedgerConnection>, result: &Result<T, LedgerError>) {
        if let Err(err) = result {
            if err.is_connection() {
                let mut slot = self.slot.lock().await;
                let current = matches!(&slot.handle, Some(handle) if Arc::ptr_eq(handle, used));
                if !current {
                    debug!(backend = self.backend.name(), error = %err, "ignoring failure from replaced handle");
                    return;
                }
                if !slot.stale {
                    warn!(backend = self.backend.name(), error = %err, "dropping ledger connection");
                }
                slot.stale = true;
            }
        }
    }
}
