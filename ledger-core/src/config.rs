//! Configuration for the ledger client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name (used in logs)
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// State reducer configuration
    pub reducer: ReducerConfig,

    /// Atom delivery configuration
    pub delivery: DeliveryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "radix-ledger-client".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            reducer: ReducerConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

/// State reducer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    /// Quiet period before a new state snapshot is published (milliseconds)
    pub debounce_ms: u64,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
        }
    }
}

impl ReducerConfig {
    /// Debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Atom delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Reconnect attempts before the feed gives up
    pub max_retry_attempts: u32,

    /// Upper bound on a single reconnect delay (seconds)
    pub max_retry_delay_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 10,
            max_retry_delay_secs: 100,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(ms) = std::env::var("RADIX_DEBOUNCE_MS") {
            config.reducer.debounce_ms = parse_env("RADIX_DEBOUNCE_MS", &ms)?;
        }

        if let Ok(attempts) = std::env::var("RADIX_MAX_RETRY_ATTEMPTS") {
            config.delivery.max_retry_attempts = parse_env("RADIX_MAX_RETRY_ATTEMPTS", &attempts)?;
        }

        if let Ok(secs) = std::env::var("RADIX_MAX_RETRY_DELAY_SECS") {
            config.delivery.max_retry_delay_secs = parse_env("RADIX_MAX_RETRY_DELAY_SECS", &secs)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("{} is not a valid number: {}", name, value)))
}
