//! Service configuration, read from the environment (and `.env` in dev).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::carrier::yalidine::DEFAULT_API_BASE;
use crate::carrier::CarrierCredentials;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
    #[error("YALIDINE_API_ID and YALIDINE_API_TOKEN must be set together")]
    HalfCredentials,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Absent: orders are kept in memory.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    /// Absent: carrier operations fail with a configuration error.
    pub carrier: Option<CarrierCredentials>,
    pub carrier_base_url: String,
    pub carrier_timeout: Duration,
    /// JSON file with products and delivery prices.
    pub catalog_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_id = var("YALIDINE_API_ID");
        let api_token = var("YALIDINE_API_TOKEN");
        if api_id.is_some() != api_token.is_some() {
            return Err(ConfigError::HalfCredentials);
        }

        Ok(Self {
            port: number(&var, "PORT", 3001)?,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            carrier: CarrierCredentials::from_parts(api_id, api_token),
            carrier_base_url: var("YALIDINE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            carrier_timeout: Duration::from_secs(number(&var, "CARRIER_TIMEOUT_SECS", 15)?),
            catalog_path: var("CATALOG_PATH").map(PathBuf::from),
        })
    }
}

fn number<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::NotANumber { name, value }),
        None => Ok(default),
    }
}
