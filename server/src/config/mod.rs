//! Runtime configuration loaded from the environment

pub mod ledger;

use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub use ledger::{
    CanisterConfig, CanisterValueType, ContractConfig, ContractSigner, LedgerBackendKind,
    LedgerConfig, LedgerNetwork,
};

pub const DEFAULT_USGS_BASE_URL: &str = "https://waterservices.usgs.gov/nwis/iv/";
pub const DEFAULT_USGS_SITE_ID: &str = "01646500";
pub const DEFAULT_USGS_PARAMETER_CODE: &str = "00065";
pub const DEFAULT_SOURCE_NAME: &str = "USGS Water Data";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub poll_interval: Duration,
    pub admin_token: Option<String>,
    pub source: SourceConfig,
    pub ledger: LedgerConfig,
}

#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub url: String,
    pub site_id: String,
    pub provider_name: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars::new(&lookup);

        let site_id = vars
            .optional("USGS_SITE_ID")
            .unwrap_or_else(|| DEFAULT_USGS_SITE_ID.to_string());
        let parameter_code = vars
            .optional("USGS_PARAMETER_CODE")
            .unwrap_or_else(|| DEFAULT_USGS_PARAMETER_CODE.to_string());
        let base_url = vars
            .optional("DATA_SOURCE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_USGS_BASE_URL.to_string());
        let url = vars.optional("DATA_SOURCE_URL").unwrap_or_else(|| {
            format!(
                "{base_url}?format=json&sites={site_id}&parameterCd={parameter_code}&siteStatus=all"
            )
        });

        let source = SourceConfig {
            url,
            site_id,
            provider_name: vars
                .optional("DATA_SOURCE_NAME")
                .unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string()),
            timeout: Duration::from_secs(vars.parse_or("DATA_SOURCE_TIMEOUT_SECONDS", 10u64)?),
        };

        let poll_interval_seconds: u64 = vars.parse_or("POLL_INTERVAL_SECONDS", 300)?;
        if poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_SECONDS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let cors_allowed_origins = vars
            .optional("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            bind_addr: vars.parse_or("BIND_ADDR", IpAddr::from([127, 0, 0, 1]))?,
            port: vars.parse_or("PORT", 3001u16)?,
            cors_allowed_origins,
            poll_interval: Duration::from_secs(poll_interval_seconds),
            admin_token: vars.optional("ADMIN_API_TOKEN"),
            source,
            ledger: LedgerConfig::from_vars(&vars)?,
        })
    }
}

/// Thin wrapper over a key lookup with typed accessors.
pub(crate) struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> Vars<'a> {
    fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    pub(crate) fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub(crate) fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    pub(crate) fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
                name: key,
                reason: format!("{raw:?}: {err}"),
            }),
            None => Ok(default),
        }
    }
}
