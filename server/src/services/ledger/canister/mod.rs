//! ICP canister backend
//!
//! Reads are query calls, writes are update calls confirmed through
//! `read_state`. Every `read_state` certificate is checked against the
//! network root key before its status is trusted. Calls are signed with an
//! Ed25519 identity when one is configured and sent as the anonymous
//! principal otherwise.

mod agent;
mod args;
mod certificate;
mod envelope;
mod identity;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use self::agent::Agent;
use self::args::Slot;
use self::certificate::RootKey;
use self::identity::Identity;
use super::{LedgerBackend, LedgerConnection};
use crate::config::{CanisterConfig, LedgerNetwork};
use crate::error::LedgerError;
use crate::models::WriteReceipt;
use crate::units::Scale;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct CanisterBackend {
    config: CanisterConfig,
    network: LedgerNetwork,
    scale: Scale,
    identity: Arc<Identity>,
    http: Client,
    poll_interval: Duration,
}

impl CanisterBackend {
    pub fn new(
        config: CanisterConfig,
        network: LedgerNetwork,
        scale: Scale,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let identity = Identity::new(config.identity.clone());
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(write_timeout)
            .build()?;

        Ok(Self {
            config,
            network,
            scale,
            identity: Arc::new(identity),
            http,
            poll_interval: STATUS_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl LedgerBackend for CanisterBackend {
    fn name(&self) -> &'static str {
        "canister"
    }

    async fn connect(&self) -> Result<Arc<dyn LedgerConnection>, LedgerError> {
        let mut agent = Agent {
            host: self.config.host.trim_end_matches('/').to_string(),
            canister_id: self.config.canister_id,
            identity: self.identity.clone(),
            http: self.http.clone(),
            poll_interval: self.poll_interval,
            root_key: RootKey::mainnet(),
        };

        let fetched = self.network.fetches_root_key();
        if fetched {
            agent.root_key = agent.fetch_root_key().await?;
        }

        let connection = CanisterConnection {
            agent,
            config: self.config.clone(),
            scale: self.scale,
        };
        connection.health_check().await?;

        info!(
            canister_id = %self.config.canister_id,
            host = %self.config.host,
            network = ?self.network,
            sender = %self.identity.sender(),
            root_key_fetched = fetched,
            "connected to canister"
        );
        Ok(Arc::new(connection))
    }
}

struct CanisterConnection {
    agent: Agent,
    config: CanisterConfig,
    scale: Scale,
}

impl CanisterConnection {
    async fn query_scaled(&self, method: &str) -> Result<i128, LedgerError> {
        let reply = self.agent.query(method, args::empty()?).await?;
        args::decode_scaled(&reply, self.scale)
            .map_err(|err| LedgerError::InvalidResponse(format!("{method}: {err}")))
    }

    async fn update_unit(&self, method: &str, arg: Vec<u8>) -> Result<WriteReceipt, LedgerError> {
        let (request_id, reply) = self.agent.update(method, arg).await?;
        if let Some(reply) = reply {
            let outcome = args::decode_unit_result(&reply)
                .map_err(|err| LedgerError::InvalidResponse(format!("{method}: {err}")))?;
            outcome.map_err(LedgerError::WriteRejected)?;
        }

        let reference = hex::encode(request_id);
        info!(method, %reference, "canister update confirmed");
        Ok(WriteReceipt {
            reference,
            block: None,
        })
    }

    fn encode(&self, scaled: i128, slot: Slot) -> Result<Vec<u8>, LedgerError> {
        args::encode_scaled(scaled, slot, self.config.value_type, self.scale)
    }
}

#[async_trait]
impl LedgerConnection for CanisterConnection {
    async fn health_check(&self) -> Result<(), LedgerError> {
        self.query_scaled(&self.config.read_method).await.map(|_| ())
    }

    async fn write_value(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        let arg = self.encode(scaled, Slot::Level)?;
        self.update_unit(&self.config.write_method, arg).await
    }

    async fn read_value(&self) -> Result<i128, LedgerError> {
        self.query_scaled(&self.config.read_method).await
    }

    async fn read_threshold(&self) -> Result<i128, LedgerError> {
        self.query_scaled(&self.config.threshold_method).await
    }

    async fn write_threshold(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        let arg = self.encode(scaled, Slot::Threshold)?;
        self.update_unit(&self.config.set_threshold_method, arg).await
    }
}
