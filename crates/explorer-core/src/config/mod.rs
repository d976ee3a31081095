//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file named by the `EXPLORER_CONFIG` env var
//!    (default `config/explorer.toml`, optional)
//! 3. **Environment variables**: `EXPLORER__SECTION__KEY` overrides single fields
//!
//! # Configuration Sections
//!
//! - [`RegistryConfig`]: where the provider registry is persisted, initial network
//! - [`TransportConfig`]: HTTP client limits and the optional CORS-bypass proxy
//! - [`FailoverConfigSection`]: retry count, backoff and per-attempt timeout
//! - [`HealthConfig`]: background probing
//! - [`SyncSection`]: window, cache sizes and throttling of the incremental sync
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [registry]
//! default_network = "mainnet"
//!
//! [failover]
//! max_attempts = 3
//! initial_backoff_ms = 100
//!
//! [sync]
//! window = 20
//! max_transactions = 1000
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use url::Url;

use crate::{
    cache::{BlockCacheConfig, SyncConfig, TransactionCacheConfig},
    explorer::ExplorerSettings,
    provider::{FailoverConfig, HttpTransportConfig},
    types::Network,
};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "EXPLORER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/explorer.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding the persisted registry. Defaults to `.explorer`.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Network selected when nothing is persisted yet. Defaults to `testnet`.
    #[serde(default = "default_network")]
    pub default_network: Network,
}

fn default_storage_dir() -> String {
    ".explorer".to_string()
}

fn default_network() -> Network {
    Network::Testnet
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// CORS-bypass proxy. Unset sends requests straight to the providers.
    #[serde(default)]
    pub proxy_url: Option<String>,

    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// How long a request waits for a free concurrency permit.
    #[serde(default = "default_permit_timeout_seconds")]
    pub permit_timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_concurrent_limit() -> usize {
    64
}

fn default_connect_timeout_seconds() -> u64 {
    5
}

fn default_permit_timeout_seconds() -> u64 {
    5
}

fn default_user_agent() -> String {
    concat!("chain-explorer/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Retry policy of the failover engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfigSection {
    /// Attempts per provider before moving to the next one. Defaults to `3`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sleep before the second attempt. Defaults to `100`.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Defaults to `3.0`.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Per-attempt timeout. Defaults to `10`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    3.0
}

fn default_request_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Run the background health checker. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,

    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout_seconds() -> u64 {
    10
}

fn default_check_interval_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Run the background sync poller. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Heights covered by the first sync. Defaults to `10`.
    #[serde(default = "default_window")]
    pub window: u64,

    /// Transactions retained in the cache. Defaults to `500`.
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,

    #[serde(default = "default_block_cache_capacity")]
    pub block_cache_capacity: usize,

    /// Heights fetched in parallel. Defaults to `2`.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Longest explicit range query, in heights. Defaults to `1000`.
    #[serde(default = "default_max_range")]
    pub max_range: u64,

    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_window() -> u64 {
    10
}

fn default_max_transactions() -> usize {
    500
}

fn default_block_cache_capacity() -> usize {
    1000
}

fn default_concurrency() -> usize {
    2
}

fn default_max_range() -> u64 {
    1000
}

fn default_batch_delay_ms() -> u64 {
    250
}

fn default_poll_interval_ms() -> u64 {
    3000
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub failover: FailoverConfigSection,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { storage_dir: default_storage_dir(), default_network: default_network() }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            concurrent_limit: default_concurrent_limit(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            permit_timeout_seconds: default_permit_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FailoverConfigSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout_seconds: default_probe_timeout_seconds(),
            check_interval_seconds: default_check_interval_seconds(),
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_window(),
            max_transactions: default_max_transactions(),
            block_cache_capacity: default_block_cache_capacity(),
            concurrency: default_concurrency(),
            max_range: default_max_range(),
            batch_delay_ms: default_batch_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error. Use `__` as a separator for nested fields
    /// (e.g., `EXPLORER__SYNC__WINDOW=20`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("registry.default_network", "testnet")?
            .set_default("failover.max_attempts", 3)?
            .set_default("sync.window", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("EXPLORER").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads from `EXPLORER_CONFIG` or `config/explorer.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&config_path)
    }

    /// Checks that every numeric limit is usable and the proxy URL parses.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.registry.storage_dir.trim().is_empty() {
            return Err("Registry storage directory must not be empty".to_string());
        }

        if let Some(proxy) = &self.transport.proxy_url {
            let url = Url::parse(proxy).map_err(|e| format!("Invalid proxy URL {proxy}: {e}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("Proxy URL must use http or https: {proxy}"));
            }
        }

        if self.transport.concurrent_limit == 0 {
            return Err("Transport concurrent limit must be greater than 0".to_string());
        }

        if self.transport.connect_timeout_seconds == 0 {
            return Err("Connect timeout must be greater than 0".to_string());
        }

        if self.failover.max_attempts == 0 {
            return Err("Failover max attempts must be greater than 0".to_string());
        }

        if !self.failover.backoff_multiplier.is_finite() || self.failover.backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be a finite number >= 1".to_string());
        }

        if self.failover.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        if self.health.probe_timeout_seconds == 0 {
            return Err("Health probe timeout must be greater than 0".to_string());
        }

        if self.health.check_interval_seconds == 0 {
            return Err("Health check interval must be greater than 0".to_string());
        }

        if self.sync.window == 0 {
            return Err("Sync window must be greater than 0".to_string());
        }

        if self.sync.max_transactions == 0 {
            return Err("Max transactions must be greater than 0".to_string());
        }

        if self.sync.block_cache_capacity == 0 {
            return Err("Block cache capacity must be greater than 0".to_string());
        }

        if self.sync.concurrency == 0 {
            return Err("Sync concurrency must be greater than 0".to_string());
        }

        if self.sync.max_range < self.sync.window {
            return Err("Sync max_range must be at least the sync window".to_string());
        }

        if self.sync.poll_interval_ms == 0 {
            return Err("Poll interval must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    #[must_use]
    pub fn failover_config(&self) -> FailoverConfig {
        FailoverConfig {
            max_attempts: self.failover.max_attempts,
            initial_backoff: Duration::from_millis(self.failover.initial_backoff_ms),
            backoff_multiplier: self.failover.backoff_multiplier,
            request_timeout: Duration::from_secs(self.failover.request_timeout_seconds),
        }
    }

    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            window: self.sync.window,
            concurrency: self.sync.concurrency,
            max_range: self.sync.max_range,
            batch_delay: Duration::from_millis(self.sync.batch_delay_ms),
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
        }
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health.check_interval_seconds)
    }

    #[must_use]
    pub fn explorer_settings(&self) -> ExplorerSettings {
        ExplorerSettings {
            failover: self.failover_config(),
            probe_timeout: Duration::from_secs(self.health.probe_timeout_seconds),
            block_cache: BlockCacheConfig { capacity: self.sync.block_cache_capacity },
            transaction_cache: TransactionCacheConfig {
                max_transactions: self.sync.max_transactions,
            },
            sync: self.sync_config(),
        }
    }

    /// # Errors
    ///
    /// Returns an error string if the proxy URL does not parse.
    pub fn transport_config(&self) -> Result<HttpTransportConfig, String> {
        let proxy_url = self
            .transport
            .proxy_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| format!("Invalid proxy URL: {e}"))?;

        Ok(HttpTransportConfig {
            concurrent_limit: self.transport.concurrent_limit,
            permit_timeout: Duration::from_secs(self.transport.permit_timeout_seconds),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_seconds),
            user_agent: self.transport.user_agent.clone(),
            proxy_url,
        })
    }
}
