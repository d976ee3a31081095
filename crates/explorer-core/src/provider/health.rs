//! Advisory provider health.
//!
//! Health records are informational: they are shown to operators and refreshed by every
//! real request and every probe, but they never remove a provider from rotation.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    provider::{
        registry::ProviderRegistry,
        transport::{RpcReply, Transport},
    },
    types::JsonRpcRequest,
};

/// Default hard timeout of a [`HealthMonitor::test_provider`] probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Best-effort status of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub is_healthy: bool,
    pub last_checked: DateTime<Utc>,
    pub response_time: Option<Duration>,
    pub error: Option<String>,
}

impl ProviderHealth {
    fn unknown() -> Self {
        Self { is_healthy: false, last_checked: Utc::now(), response_time: None, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::unknown() }
    }

    /// Applies a partial update and refreshes `last_checked`.
    pub fn merge(&mut self, update: HealthUpdate) {
        if let Some(is_healthy) = update.is_healthy {
            self.is_healthy = is_healthy;
        }
        if let Some(response_time) = update.response_time {
            self.response_time = response_time;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        self.last_checked = Utc::now();
    }
}

/// Partial health update; `None` fields leave the existing value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthUpdate {
    pub is_healthy: Option<bool>,
    pub response_time: Option<Option<Duration>>,
    pub error: Option<Option<String>>,
}

impl HealthUpdate {
    /// Reachable, with the observed latency; clears any previous error.
    #[must_use]
    pub fn healthy(response_time: Duration) -> Self {
        Self { is_healthy: Some(true), response_time: Some(Some(response_time)), error: Some(None) }
    }

    /// Unreachable; keeps the last known latency.
    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self { is_healthy: Some(false), response_time: None, error: Some(Some(error.into())) }
    }
}

/// Per-provider health records plus explicit probing.
pub struct HealthMonitor {
    records: DashMap<String, ProviderHealth, ahash::RandomState>,
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            records: DashMap::with_hasher(ahash::RandomState::new()),
            registry,
            transport,
            probe_timeout,
        }
    }

    /// Merges `update` into the record of `id`, creating it on first use.
    pub fn update_health(&self, id: &str, update: HealthUpdate) {
        self.records.entry(id.to_string()).or_insert_with(ProviderHealth::unknown).merge(update);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ProviderHealth> {
        self.records.get(id).map(|record| record.value().clone())
    }

    /// Every record, sorted by provider id.
    #[must_use]
    pub fn all(&self) -> Vec<(String, ProviderHealth)> {
        let mut all: Vec<_> =
            self.records.iter().map(|r| (r.key().clone(), r.value().clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drops the record of a removed provider.
    pub fn forget(&self, id: &str) {
        self.records.remove(id);
    }

    /// Drops records of providers no longer in the registry.
    pub fn retain_known(&self) {
        self.records.retain(|id, _| self.registry.find(id).is_some());
    }

    /// Probes a provider with a `status` call.
    ///
    /// Never fails: unknown providers and failed probes produce an unhealthy record. The
    /// result is stored for known providers.
    pub async fn test_provider(&self, id: &str) -> ProviderHealth {
        let Some(provider) = self.registry.find(id) else {
            return ProviderHealth::failed(format!("Provider '{id}' not found"));
        };

        let update = self.probe(&provider.url).await;
        debug!(id = %id, healthy = ?update.is_healthy, "provider probe finished");
        self.update_health(id, update);
        self.get(id).unwrap_or_else(ProviderHealth::unknown)
    }

    async fn probe(&self, url: &str) -> HealthUpdate {
        let request = JsonRpcRequest::new("status", serde_json::json!([]), 1);
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => return HealthUpdate::unhealthy(e.to_string()),
        };

        let started = Instant::now();
        let sent = tokio::time::timeout(
            self.probe_timeout,
            self.transport.send(url, payload, self.probe_timeout),
        )
        .await;
        let elapsed = started.elapsed();

        match sent {
            Err(_) => HealthUpdate::unhealthy(format!(
                "probe timed out after {}s",
                self.probe_timeout.as_secs_f64()
            )),
            Ok(Err(e)) => HealthUpdate::unhealthy(e.to_string()),
            Ok(Ok(response)) => match response.decode() {
                Ok(RpcReply::Success(_)) => HealthUpdate::healthy(elapsed),
                Ok(RpcReply::Error(e)) => HealthUpdate {
                    response_time: Some(Some(elapsed)),
                    ..HealthUpdate::unhealthy(e.to_string())
                },
                Err(e) => HealthUpdate::unhealthy(e.to_string()),
            },
        }
    }
}

/// Background task probing every enabled provider of the selected network.
pub struct HealthChecker {
    monitor: Arc<HealthMonitor>,
    registry: Arc<ProviderRegistry>,
    check_interval: Duration,
}

impl HealthChecker {
    #[must_use]
    pub fn new(
        monitor: Arc<HealthMonitor>,
        registry: Arc<ProviderRegistry>,
        check_interval: Duration,
    ) -> Self {
        Self { monitor, registry, check_interval }
    }

    /// Spawns the probing loop; it exits when `shutdown` is cancelled.
    #[must_use]
    pub fn start_with_shutdown(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let monitor = self.monitor.clone();
        let registry = self.registry.clone();
        let check_interval = self.check_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Self::check_all(&monitor, &registry).await;
                    }
                    () = shutdown.cancelled() => {
                        info!("health checker shutting down");
                        break;
                    }
                }
            }
        })
    }

    async fn check_all(monitor: &HealthMonitor, registry: &ProviderRegistry) {
        let snapshot = registry.snapshot();
        let probes = snapshot.providers.iter().map(|p| monitor.test_provider(&p.id));
        let results = futures::future::join_all(probes).await;

        let healthy = results.iter().filter(|h| h.is_healthy).count();
        debug!(
            network = %snapshot.network,
            healthy = healthy,
            total = results.len(),
            "health check round completed"
        );
    }
}
