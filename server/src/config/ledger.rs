use std::str::FromStr;
use std::time::Duration;

use candid::Principal;

use super::Vars;
use crate::error::ConfigError;
use crate::units::{Scale, DEFAULT_SCALE_DECIMALS};

/// Which ledger implementation receives the scaled readings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerBackendKind {
    /// EVM smart contract reached over JSON-RPC.
    Contract,
    /// Internet Computer canister reached over the HTTP interface.
    Canister,
}

impl FromStr for LedgerBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contract" | "evm" => Ok(Self::Contract),
            "canister" | "icp" => Ok(Self::Canister),
            other => Err(format!("unknown ledger backend {other:?}")),
        }
    }
}

/// Network class of the ledger. Only non-mainnet networks bootstrap a root key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerNetwork {
    Local,
    Test,
    Main,
}

impl LedgerNetwork {
    pub fn fetches_root_key(self) -> bool {
        matches!(self, Self::Local | Self::Test)
    }
}

impl FromStr for LedgerNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "test" | "testnet" => Ok(Self::Test),
            "main" | "mainnet" | "ic" => Ok(Self::Main),
            other => Err(format!("unknown ledger network {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub backend: LedgerBackendKind,
    pub network: LedgerNetwork,
    pub scale: Scale,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub contract: Option<ContractConfig>,
    pub canister: Option<CanisterConfig>,
}

/// Who signs contract transactions.
#[derive(Clone, Debug)]
pub enum ContractSigner {
    /// `eth_sendTransaction` from an account unlocked on the node.
    Node { from_address: String },
    /// Signed in-process and submitted with `eth_sendRawTransaction`.
    Local(k256::ecdsa::SigningKey),
}

#[derive(Clone, Debug)]
pub struct ContractConfig {
    pub rpc_url: String,
    pub oracle_address: String,
    pub threshold_address: String,
    pub signer: ContractSigner,
    pub write_method: String,
    pub read_method: String,
    pub threshold_method: String,
    pub set_threshold_method: String,
}

/// Candid type the canister uses for levels and thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanisterValueType {
    /// Scaled integers: `int64` levels and `nat64` thresholds.
    Integer,
    /// `float64` feet.
    Float,
}

impl FromStr for CanisterValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "int64" | "integer" => Ok(Self::Integer),
            "float" | "float64" => Ok(Self::Float),
            other => Err(format!("unknown canister value type {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CanisterConfig {
    pub host: String,
    pub canister_id: Principal,
    /// Ed25519 signing key. `None` signs nothing and calls as the anonymous principal.
    pub identity: Option<ed25519_dalek::SigningKey>,
    pub value_type: CanisterValueType,
    pub write_method: String,
    pub read_method: String,
    pub threshold_method: String,
    pub set_threshold_method: String,
}

impl LedgerConfig {
    pub(crate) fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let backend: LedgerBackendKind = vars
            .required("LEDGER_BACKEND")?
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                name: "LEDGER_BACKEND",
                reason,
            })?;

        let decimals = vars.parse_or("LEDGER_SCALE_DECIMALS", DEFAULT_SCALE_DECIMALS)?;
        let scale = Scale::new(decimals).map_err(|err| ConfigError::Invalid {
            name: "LEDGER_SCALE_DECIMALS",
            reason: err.to_string(),
        })?;

        let mut config = Self {
            backend,
            network: vars.parse_or("LEDGER_NETWORK", LedgerNetwork::Local)?,
            scale,
            connect_timeout: Duration::from_secs(
                vars.parse_or("LEDGER_CONNECT_TIMEOUT_SECONDS", 5u64)?,
            ),
            write_timeout: Duration::from_secs(vars.parse_or("LEDGER_WRITE_TIMEOUT_SECONDS", 60u64)?),
            contract: None,
            canister: None,
        };

        match backend {
            LedgerBackendKind::Contract => {
                let oracle_address = vars.required("ORACLE_CONTRACT_ADDRESS")?;
                config.contract = Some(ContractConfig {
                    rpc_url: vars.required("LEDGER_RPC_URL")?,
                    threshold_address: vars
                        .optional("THRESHOLD_CONTRACT_ADDRESS")
                        .unwrap_or_else(|| oracle_address.clone()),
                    oracle_address,
                    signer: contract_signer(vars)?,
                    write_method: method(vars, "LEDGER_WRITE_METHOD", "updateAnswer(int256)"),
                    read_method: method(vars, "LEDGER_READ_METHOD", "latestAnswer()"),
                    threshold_method: method(vars, "LEDGER_THRESHOLD_METHOD", "floodThreshold()"),
                    set_threshold_method: method(
                        vars,
                        "LEDGER_SET_THRESHOLD_METHOD",
                        "setThreshold(uint256)",
                    ),
                });
            }
            LedgerBackendKind::Canister => {
                let canister_id = vars.required("ICP_CANISTER_ID")?;
                let canister_id =
                    Principal::from_text(&canister_id).map_err(|err| ConfigError::Invalid {
                        name: "ICP_CANISTER_ID",
                        reason: format!("{canister_id:?}: {err}"),
                    })?;
                let identity = vars
                    .optional("ICP_IDENTITY_SECRET")
                    .map(|raw| secret_bytes("ICP_IDENTITY_SECRET", &raw))
                    .transpose()?
                    .map(|seed| ed25519_dalek::SigningKey::from_bytes(&seed));

                config.canister = Some(CanisterConfig {
                    host: vars.required("ICP_HOST")?,
                    canister_id,
                    identity,
                    value_type: vars.parse_or("ICP_VALUE_TYPE", CanisterValueType::Integer)?,
                    write_method: method(vars, "ICP_WRITE_METHOD", "set_flood_level"),
                    read_method: method(vars, "ICP_READ_METHOD", "get_flood_level"),
                    threshold_method: method(vars, "ICP_THRESHOLD_METHOD", "get_flood_threshold"),
                    set_threshold_method: method(
                        vars,
                        "ICP_SET_THRESHOLD_METHOD",
                        "set_flood_threshold",
                    ),
                });
            }
        }

        Ok(config)
    }
}

fn method(vars: &Vars<'_>, key: &str, default: &str) -> String {
    vars.optional(key).unwrap_or_else(|| default.to_string())
}

/// A local key wins over a node-managed sender.
fn contract_signer(vars: &Vars<'_>) -> Result<ContractSigner, ConfigError> {
    if let Some(raw) = vars.optional("LEDGER_PRIVATE_KEY") {
        let bytes = secret_bytes("LEDGER_PRIVATE_KEY", &raw)?;
        let key = k256::ecdsa::SigningKey::from_slice(&bytes).map_err(|_| ConfigError::Invalid {
            name: "LEDGER_PRIVATE_KEY",
            reason: "not a valid secp256k1 scalar".to_string(),
        })?;
        return Ok(ContractSigner::Local(key));
    }

    match vars.optional("LEDGER_FROM_ADDRESS") {
        Some(from_address) => Ok(ContractSigner::Node { from_address }),
        None => Err(ConfigError::Missing("LEDGER_PRIVATE_KEY")),
    }
}

/// Decode a 32-byte hex secret. The value itself never appears in the error.
fn secret_bytes(name: &'static str, raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(|err| ConfigError::Invalid {
        name,
        reason: format!("not hex: {err}"),
    })?;
    bytes.as_slice().try_into().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("expected 32 bytes, got {}", bytes.len()),
    })
}
