//! Test Helper Functions and Utilities
//!
//! Builders for explorers wired to mockito endpoints over the real HTTP transport.

use explorer_core::{
    explorer::ExplorerSettings,
    provider::{
        FailoverConfig, HttpTransport, HttpTransportConfig, MemoryStore, Provider,
        ProviderRegistry,
    },
    Explorer, Network,
};
use std::{sync::Arc, time::Duration};

/// Address nothing listens on; connections are refused immediately.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

/// Three attempts per provider with millisecond backoff.
#[must_use]
pub fn fast_failover() -> FailoverConfig {
    FailoverConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        request_timeout: Duration::from_secs(5),
    }
}

/// Explorer settings with fast failover and a sync that does not pause between batches.
#[must_use]
pub fn fast_settings() -> ExplorerSettings {
    let mut settings =
        ExplorerSettings { failover: fast_failover(), ..ExplorerSettings::default() };
    settings.sync.batch_delay = Duration::ZERO;
    settings.probe_timeout = Duration::from_secs(2);
    settings
}

/// In-memory registry whose selected network is `Custom`, holding one provider per URL.
///
/// # Panics
///
/// Panics if a URL is rejected by the registry.
#[must_use]
pub fn custom_registry(urls: &[&str]) -> (Arc<ProviderRegistry>, Vec<Provider>) {
    let registry =
        Arc::new(ProviderRegistry::open(Arc::new(MemoryStore::new()), Network::Custom).unwrap());
    let providers = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            registry.add_custom_provider(&format!("mock-{i}"), url, Network::Custom).unwrap()
        })
        .collect();
    (registry, providers)
}

/// Explorer over `urls` using the reqwest transport.
///
/// # Panics
///
/// Panics if the transport or the explorer cannot be built.
#[must_use]
pub fn http_explorer(urls: &[&str], settings: ExplorerSettings) -> (Explorer, Vec<Provider>) {
    http_explorer_with_transport(urls, HttpTransportConfig::default(), settings)
}

/// Like [`http_explorer`] with a custom transport configuration.
///
/// # Panics
///
/// Panics if the transport or the explorer cannot be built.
#[must_use]
pub fn http_explorer_with_transport(
    urls: &[&str],
    transport: HttpTransportConfig,
    settings: ExplorerSettings,
) -> (Explorer, Vec<Provider>) {
    let (registry, providers) = custom_registry(urls);
    let transport = Arc::new(HttpTransport::with_config(transport).unwrap());
    let explorer = Explorer::new(registry, transport, settings).unwrap();
    (explorer, providers)
}
