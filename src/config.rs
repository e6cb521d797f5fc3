//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::StoreOptions;
use crate::listeners::NotifierConfig;

/// Which funding source feeds the pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletBackend {
    Void,
    Webhook,
}

impl std::str::FromStr for WalletBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "void" | "voidwallet" => Ok(WalletBackend::Void),
            "webhook" | "webhookwallet" => Ok(WalletBackend::Webhook),
            _ => Err(ConfigError::InvalidValue("WALLET_BACKEND")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Folder holding one `<name>.db` file per store
    pub data_folder: PathBuf,

    /// Pool size for each store
    pub store_max_connections: u32,

    /// SQLite busy timeout
    pub store_busy_timeout: Duration,

    /// Listener tasks allowed to run at once
    pub listener_max_in_flight: usize,

    /// Funding source
    pub wallet_backend: WalletBackend,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_folder = lookup("DATA_FOLDER")
            .unwrap_or_else(|| "./data".to_string())
            .into();

        let store_max_connections = parse_or(&lookup, "STORE_MAX_CONNECTIONS", 5)?;
        if store_max_connections == 0 {
            return Err(ConfigError::InvalidValue("STORE_MAX_CONNECTIONS"));
        }

        let busy_timeout_ms: u64 = parse_or(&lookup, "STORE_BUSY_TIMEOUT_MS", 5000)?;

        let listener_max_in_flight = parse_or(&lookup, "LISTENER_MAX_IN_FLIGHT", 256)?;
        if listener_max_in_flight == 0 {
            return Err(ConfigError::InvalidValue("LISTENER_MAX_IN_FLIGHT"));
        }

        let wallet_backend = lookup("WALLET_BACKEND")
            .unwrap_or_else(|| "void".to_string())
            .parse()?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 5000)?;
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        Ok(Self {
            data_folder,
            store_max_connections,
            store_busy_timeout: Duration::from_millis(busy_timeout_ms),
            listener_max_in_flight,
            wallet_backend,
            host,
            port,
            environment,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.store_max_connections,
            busy_timeout: self.store_busy_timeout,
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            max_in_flight: self.listener_max_in_flight,
            ..NotifierConfig::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
