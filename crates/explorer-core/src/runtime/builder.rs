//! Builder that assembles an [`ExplorerRuntime`] from an [`AppConfig`].

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    explorer::{Explorer, ExplorerError},
    provider::{
        FileStore, HttpTransport, KeyValueStore, ProviderRegistry, RegistryError, Transport,
        TransportError,
    },
};

use super::lifecycle::ExplorerRuntime;

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Failed to open provider registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to create HTTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to initialize explorer: {0}")]
    Explorer(#[from] ExplorerError),
}

#[derive(Clone, Copy, Default)]
struct RuntimeOptions {
    /// `None` defers to `health.enabled` in the config.
    health_checker: Option<bool>,
    /// `None` defers to `sync.enabled` in the config.
    sync_poller: Option<bool>,
}

/// Builder for constructing an [`ExplorerRuntime`].
///
/// The registry store defaults to a [`FileStore`] under `registry.storage_dir` and the
/// transport to an [`HttpTransport`] built from the `transport` section. Both can be
/// replaced, which is how tests run the runtime against scripted endpoints.
///
/// # Examples
///
/// ```no_run
/// # use explorer_core::{config::AppConfig, runtime::ExplorerRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = ExplorerRuntimeBuilder::new()
///     .with_config(AppConfig::load()?)
///     .disable_sync_poller()
///     .build()?;
///
/// let status = runtime.explorer().get_status().await?;
/// println!("tip: {}", status.latest_block_height);
/// runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ExplorerRuntimeBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    options: RuntimeOptions,
}

impl ExplorerRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, store: None, transport: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Probes enabled providers every `health.check_interval_seconds`.
    #[must_use]
    pub fn enable_health_checker(mut self) -> Self {
        self.options.health_checker = Some(true);
        self
    }

    #[must_use]
    pub fn disable_health_checker(mut self) -> Self {
        self.options.health_checker = Some(false);
        self
    }

    /// Polls the chain tip and syncs recent transactions every `sync.poll_interval_ms`.
    #[must_use]
    pub fn enable_sync_poller(mut self) -> Self {
        self.options.sync_poller = Some(true);
        self
    }

    #[must_use]
    pub fn disable_sync_poller(mut self) -> Self {
        self.options.sync_poller = Some(false);
        self
    }

    /// Builds the runtime and starts the enabled background tasks.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the configuration is missing or invalid, the registry
    /// cannot be loaded, or a component fails to initialize.
    pub fn build(self) -> Result<ExplorerRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let enable_health_checker = self.options.health_checker.unwrap_or(config.health.enabled);
        let enable_sync_poller = self.options.sync_poller.unwrap_or(config.sync.enabled);
        info!(
            default_network = %config.registry.default_network,
            health_checker_enabled = enable_health_checker,
            sync_poller_enabled = enable_sync_poller,
            "Initializing explorer runtime"
        );

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::new(&config.registry.storage_dir)),
        };
        let registry = Arc::new(ProviderRegistry::open(store, config.registry.default_network)?);
        debug!(network = %registry.selected_network(), "Provider registry loaded");

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let transport_config =
                    config.transport_config().map_err(RuntimeError::ConfigValidation)?;
                Arc::new(HttpTransport::with_config(transport_config)?)
            }
        };
        debug!("Transport initialized");

        let explorer = Arc::new(Explorer::new(registry, transport, config.explorer_settings())?);

        let runtime =
            ExplorerRuntime::new(explorer, config, enable_health_checker, enable_sync_poller);
        info!("Explorer runtime initialization complete");
        Ok(runtime)
    }
}

impl Default for ExplorerRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::MemoryStore, test_utils::MockTransport, types::Network};

    fn builder() -> ExplorerRuntimeBuilder {
        ExplorerRuntimeBuilder::new()
            .with_store(Arc::new(MemoryStore::new()))
            .with_transport(Arc::new(MockTransport::new()))
    }

    #[tokio::test]
    async fn test_builder_requires_config() {
        let result = builder().build();
        assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
    }

    #[tokio::test]
    async fn test_builder_validates_config() {
        let mut config = AppConfig::default();
        config.sync.window = 0;

        let result = builder().with_config(config).build();
        assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
    }

    #[tokio::test]
    async fn test_builder_respects_config_toggles() {
        let mut config = AppConfig::default();
        config.health.enabled = false;
        config.sync.enabled = false;
        config.registry.default_network = Network::Mainnet;

        let runtime = builder().with_config(config).build().expect("Failed to build runtime");
        assert!(!runtime.has_health_checker());
        assert!(!runtime.has_sync_poller());
        assert_eq!(runtime.explorer().network(), Network::Mainnet);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_builder_overrides_win() {
        let mut config = AppConfig::default();
        config.health.enabled = false;

        let runtime = builder()
            .with_config(config)
            .enable_health_checker()
            .disable_sync_poller()
            .build()
            .expect("Failed to build runtime");
        assert!(runtime.has_health_checker());
        assert!(!runtime.has_sync_poller());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_builder_uses_file_store_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.registry.storage_dir = dir.path().to_string_lossy().into_owned();

        let runtime = ExplorerRuntimeBuilder::new()
            .with_config(config)
            .with_transport(Arc::new(MockTransport::new()))
            .disable_health_checker()
            .disable_sync_poller()
            .build()
            .expect("Failed to build runtime");

        runtime.explorer().set_network(Network::Mainnet).unwrap();
        assert!(dir.path().join("explorer_providers.json").exists());
        runtime.shutdown().await;
    }
}
