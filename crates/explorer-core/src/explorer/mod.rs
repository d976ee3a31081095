//! The explorer facade.
//!
//! [`Explorer`] wires the registry, health monitor, failover engine, chain client and
//! caches together and is the single entry point a UI talks to.
//!
//! ```text
//!              ┌──────────── Explorer ────────────┐
//!  queries ──► │ IncrementalSync ──► ChainClient  │ ──► FailoverEngine ──► Transport
//!              │  (block + tx caches)             │          │
//!  providers ─►│ ProviderRegistry ◄── HealthMonitor ◄────────┘
//!              └──────────────────────────────────┘
//! ```
//!
//! Switching networks through the registry clears the caches, the sync cursor and the
//! chain tip, whichever handle triggered the switch.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cache::{
        BlockCache, BlockCacheConfig, BlockCacheError, CacheStats, IncrementalSync, ScanReport,
        SyncConfig, SyncOutcome, SyncPoller, TransactionCache, TransactionCacheConfig,
        TransactionCacheError,
    },
    chain::{Block, ChainClient, ChainState, ChainStatus, Transaction},
    events::Subscription,
    provider::{
        health::DEFAULT_PROBE_TIMEOUT, CurrentProviderInfo, FailoverConfig, FailoverEngine,
        FailoverEvent, HealthMonitor, MoveDirection, Provider, ProviderHealth, ProviderRegistry,
        RegistryChange, RegistryError, RegistryEvent, RpcError, Transport,
    },
    types::{BlockId, BlockRange, Network},
};

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error(transparent)]
    BlockCache(#[from] BlockCacheError),

    #[error(transparent)]
    TransactionCache(#[from] TransactionCacheError),
}

/// Tunables of everything the facade owns.
#[derive(Debug, Clone)]
pub struct ExplorerSettings {
    pub failover: FailoverConfig,
    pub probe_timeout: Duration,
    pub block_cache: BlockCacheConfig,
    pub transaction_cache: TransactionCacheConfig,
    pub sync: SyncConfig,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            failover: FailoverConfig::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            block_cache: BlockCacheConfig::default(),
            transaction_cache: TransactionCacheConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Query and provider-management entry point.
pub struct Explorer {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    engine: Arc<FailoverEngine>,
    client: ChainClient,
    sync: Arc<IncrementalSync>,
    chain_state: Arc<ChainState>,
    _registry_listener: Subscription,
}

impl Explorer {
    /// # Errors
    ///
    /// Returns [`ExplorerError`] if a cache configuration is invalid.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
        settings: ExplorerSettings,
    ) -> Result<Self, ExplorerError> {
        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            transport.clone(),
            settings.probe_timeout,
        ));
        let engine = Arc::new(FailoverEngine::new(
            registry.clone(),
            health.clone(),
            transport,
            settings.failover,
        ));
        let client = ChainClient::new(engine.clone());
        let sync = Arc::new(IncrementalSync::new(
            client.clone(),
            Arc::new(BlockCache::new(&settings.block_cache)?),
            Arc::new(TransactionCache::new(&settings.transaction_cache)?),
            settings.sync,
        ));
        let chain_state = Arc::new(ChainState::new());

        let registry_listener = registry.on_change(registry_listener(
            Arc::downgrade(&sync),
            Arc::downgrade(&chain_state),
            Arc::downgrade(&health),
        ));

        info!(network = %registry.selected_network(), "explorer initialized");
        Ok(Self {
            registry,
            health,
            engine,
            client,
            sync,
            chain_state,
            _registry_listener: registry_listener,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<FailoverEngine> {
        &self.engine
    }

    #[must_use]
    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    #[must_use]
    pub fn sync(&self) -> &Arc<IncrementalSync> {
        &self.sync
    }

    #[must_use]
    pub fn chain_state(&self) -> &Arc<ChainState> {
        &self.chain_state
    }

    /// A poller over this explorer's caches, ticking every `sync.poll_interval`.
    #[must_use]
    pub fn poller(&self) -> SyncPoller {
        SyncPoller::new(
            self.client.clone(),
            self.sync.clone(),
            self.chain_state.clone(),
            self.sync.config().poll_interval,
        )
    }

    /// Block and transaction cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.sync.blocks().stats(), self.sync.transactions().stats())
    }

    // Chain queries

    /// Node status. Also records the reported tip.
    ///
    /// # Errors
    ///
    /// Propagates failover and decode errors.
    pub async fn get_status(&self) -> Result<ChainStatus, RpcError> {
        let status = self.client.status(None).await?;
        self.chain_state.update_tip(status.latest_block_height, &status.latest_block_hash);
        Ok(status)
    }

    /// Cache-first block lookup by height or hash.
    ///
    /// # Errors
    ///
    /// Propagates failover errors on a cache miss.
    pub async fn get_block(&self, id: &BlockId) -> Result<Arc<Block>, RpcError> {
        self.sync.block(id, &CancellationToken::new()).await
    }

    /// # Errors
    ///
    /// Propagates failover and decode errors.
    pub async fn get_latest_block(&self) -> Result<Arc<Block>, RpcError> {
        let block = self.sync.latest_block(&CancellationToken::new()).await?;
        self.chain_state.update_tip(block.height, &block.hash);
        Ok(block)
    }

    /// Scans `range` and merges its transactions into the cache.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Validation`] for an empty range or one longer than the configured
    /// `max_range`, and the errors that stop a scan early; per-height failures are listed in
    /// the report.
    pub async fn get_transactions_in_range(
        &self,
        range: BlockRange,
    ) -> Result<ScanReport, RpcError> {
        self.get_transactions_in_range_with_cancel(range, &CancellationToken::new()).await
    }

    /// [`Explorer::get_transactions_in_range`] that stops when `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`Explorer::get_transactions_in_range`].
    pub async fn get_transactions_in_range_with_cancel(
        &self,
        range: BlockRange,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, RpcError> {
        self.sync.transactions_in_range(range, cancel).await
    }

    /// Up to `limit` cached transactions, newest block first.
    #[must_use]
    pub fn recent_transactions(&self, limit: usize) -> Vec<Arc<Transaction>> {
        self.sync.transactions().recent(limit)
    }

    /// Reads the tip and syncs the window up to it.
    ///
    /// # Errors
    ///
    /// Propagates the `status` error and errors that stop the sync.
    pub async fn sync_recent(&self) -> Result<SyncOutcome, RpcError> {
        self.sync_recent_with_cancel(&CancellationToken::new()).await
    }

    /// # Errors
    ///
    /// See [`Explorer::sync_recent`].
    pub async fn sync_recent_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, RpcError> {
        self.poller().poll_once(cancel).await
    }

    // Provider rotation

    #[must_use]
    pub fn get_current_provider_info(&self) -> Option<CurrentProviderInfo> {
        self.engine.current_provider()
    }

    /// Pins the rotation to `id`.
    ///
    /// # Errors
    ///
    /// See [`FailoverEngine::select_provider`].
    pub fn select_provider(&self, id: &str) -> Result<Provider, RegistryError> {
        self.engine.select_provider(id)
    }

    #[must_use = "dropping the subscription detaches the listener immediately"]
    pub fn on_failover_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FailoverEvent) + Send + Sync + 'static,
    {
        self.engine.on_failover_event(listener)
    }

    #[must_use]
    pub fn subscribe_failover_events(&self) -> tokio::sync::broadcast::Receiver<FailoverEvent> {
        self.engine.subscribe()
    }

    // Provider management

    #[must_use]
    pub fn network(&self) -> Network {
        self.registry.selected_network()
    }

    /// Switches the active network. Caches and the tip are cleared by the registry listener.
    ///
    /// # Errors
    ///
    /// See [`ProviderRegistry::set_selected_network`].
    pub fn set_network(&self, network: Network) -> Result<bool, RegistryError> {
        self.registry.set_selected_network(network)
    }

    #[must_use]
    pub fn providers(&self, network: Network) -> Vec<Provider> {
        self.registry.get_all_providers(network)
    }

    #[must_use]
    pub fn enabled_providers(&self) -> Vec<Provider> {
        self.registry.get_enabled_providers(self.network())
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::toggle_provider`].
    pub fn toggle_provider(&self, id: &str) -> Result<bool, RegistryError> {
        self.registry.toggle_provider(id)
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::enable_all_in_network`].
    pub fn enable_all_providers(&self) -> Result<usize, RegistryError> {
        self.registry.enable_all_in_network()
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::disable_all_in_network`].
    pub fn disable_all_providers(&self) -> Result<usize, RegistryError> {
        self.registry.disable_all_in_network()
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::move_provider`].
    pub fn move_provider(&self, id: &str, direction: MoveDirection) -> Result<bool, RegistryError> {
        self.registry.move_provider(id, direction)
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::add_custom_provider`].
    pub fn add_custom_provider(
        &self,
        name: &str,
        url: &str,
        network: Network,
    ) -> Result<Provider, RegistryError> {
        self.registry.add_custom_provider(name, url, network)
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::remove_custom_provider`].
    pub fn remove_custom_provider(&self, id: &str) -> Result<Provider, RegistryError> {
        self.registry.remove_custom_provider(id)
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::reset_to_defaults`].
    pub fn reset_providers(&self) -> Result<(), RegistryError> {
        self.registry.reset_to_defaults()
    }

    pub async fn test_provider(&self, id: &str) -> ProviderHealth {
        self.health.test_provider(id).await
    }

    #[must_use]
    pub fn provider_health(&self, id: &str) -> Option<ProviderHealth> {
        self.health.get(id)
    }
}

fn registry_listener(
    sync: Weak<IncrementalSync>,
    chain_state: Weak<ChainState>,
    health: Weak<HealthMonitor>,
) -> impl Fn(&RegistryEvent) + Send + Sync + 'static {
    move |event| match &event.change {
        RegistryChange::NetworkChanged { from, to } => {
            debug!(from = %from, to = %to, "network changed, clearing caches");
            if let Some(sync) = sync.upgrade() {
                sync.reset();
            }
            if let Some(chain_state) = chain_state.upgrade() {
                chain_state.reset();
            }
        }
        RegistryChange::Removed { id, .. } => {
            if let Some(health) = health.upgrade() {
                health.forget(id);
            }
        }
        RegistryChange::Reset => {
            if let Some(health) = health.upgrade() {
                health.retain_known();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ScanStop,
        provider::MemoryStore,
        test_utils::{MockChain, MockReply, MockTransport},
    };
    use parking_lot::Mutex;

    fn explorer_with(transport: Arc<MockTransport>, network: Network) -> Explorer {
        let registry =
            Arc::new(ProviderRegistry::open(Arc::new(MemoryStore::new()), network).unwrap());
        Explorer::new(registry, transport, ExplorerSettings::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_go_through_cache() {
        let chain = MockChain::new(500, 3);
        let transport = Arc::new(chain.transport());
        let explorer = explorer_with(transport.clone(), Network::Testnet);

        let status = explorer.get_status().await.unwrap();
        assert_eq!(status.latest_block_height, 500);
        assert_eq!(explorer.chain_state().current_tip(), 500);

        explorer.get_block(&BlockId::Height(420)).await.unwrap();
        explorer.get_block(&BlockId::Height(420)).await.unwrap();
        assert_eq!(transport.method_count("block"), 1);

        let latest = explorer.get_latest_block().await.unwrap();
        assert_eq!(latest.height, 500);
        let (blocks, _) = explorer.cache_stats();
        assert_eq!(blocks.entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_recent_and_recent_transactions() {
        let chain = MockChain::new(1000, 1);
        let explorer = explorer_with(Arc::new(chain.transport()), Network::Testnet);

        let outcome = explorer.sync_recent().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Synced { cursor: Some(1000), .. }));

        let recent = explorer.recent_transactions(3);
        let heights: Vec<u64> = recent.iter().map(|t| t.block_height).collect();
        assert_eq!(heights, vec![1000, 999, 998]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_scan_reports_failures() {
        let chain = MockChain::new(100, 1);
        chain.fail(52);
        let explorer = explorer_with(Arc::new(chain.transport()), Network::Localnet);

        let report = explorer.get_transactions_in_range(BlockRange::new(50, 54)).await.unwrap();
        assert_eq!(report.failed_heights, vec![52]);
        assert_eq!(report.transactions.len(), 4);
        assert_eq!(report.stop, ScanStop::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_switch_clears_state() {
        let chain = MockChain::new(300, 1);
        let explorer = explorer_with(Arc::new(chain.transport()), Network::Testnet);
        explorer.sync_recent().await.unwrap();
        assert!(!explorer.recent_transactions(10).is_empty());

        assert!(explorer.set_network(Network::Mainnet).unwrap());
        assert!(explorer.recent_transactions(10).is_empty());
        assert!(explorer.sync().blocks().is_empty());
        assert_eq!(explorer.sync().cursor().last_processed_height(), None);
        assert_eq!(explorer.chain_state().current_tip(), 0);

        assert!(!explorer.set_network(Network::Mainnet).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_events_reach_listener() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default("https://rpc.testnet.near.org", MockReply::connection_refused());
        transport.set_default(
            "https://test.rpc.fastnear.com",
            MockReply::result(crate::test_utils::status_json(7)),
        );
        let explorer = explorer_with(transport, Network::Testnet);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = explorer.on_failover_event(move |e| sink.lock().push(e.clone()));

        explorer.get_status().await.unwrap();
        assert!(matches!(
            seen.lock().as_slice(),
            [FailoverEvent::ProviderSwitched { to, .. }] if to == "fastnear-testnet"
        ));
        let info = explorer.get_current_provider_info().unwrap();
        assert_eq!(info.provider.id, "lava-testnet");
        assert!(explorer.provider_health("fastnear-testnet").unwrap().is_healthy);

        subscription.unsubscribe();
        explorer.select_provider("near-testnet").unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_removing_custom_provider_forgets_health() {
        let transport = Arc::new(MockTransport::new());
        let explorer = explorer_with(transport.clone(), Network::Testnet);
        let custom = explorer
            .add_custom_provider("mine", "https://rpc.example.org", Network::Testnet)
            .unwrap();
        transport.set_default(&custom.url, MockReply::result(crate::test_utils::status_json(1)));

        assert!(explorer.test_provider(&custom.id).await.is_healthy);
        assert!(explorer.provider_health(&custom.id).is_some());

        explorer.remove_custom_provider(&custom.id).unwrap();
        assert!(explorer.provider_health(&custom.id).is_none());
    }

    #[test]
    fn test_invalid_cache_settings() {
        let registry = Arc::new(
            ProviderRegistry::open(Arc::new(MemoryStore::new()), Network::Testnet).unwrap(),
        );
        let settings = ExplorerSettings {
            transaction_cache: TransactionCacheConfig { max_transactions: 0 },
            ..ExplorerSettings::default()
        };
        assert!(matches!(
            Explorer::new(registry, Arc::new(MockTransport::new()), settings),
            Err(ExplorerError::TransactionCache(_))
        ));
    }
}
