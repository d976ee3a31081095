//! Failover execution engine.
//!
//! Executes one logical JSON-RPC call against the enabled providers of the selected
//! network:
//!
//! ```text
//!  snapshot(registry) ──► empty? ──► NoProvidersAvailable
//!        │
//!        ▼
//!  cursor (index, generation) ── generation differs ──► reset to 0
//!        │
//!        ▼
//!  ┌──────────── provider loop (each provider at most once) ────────────┐
//!  │  attempt 1..=max_attempts, sleep initial*mult^(k-2) before k > 1   │
//!  │    success            ──► health ok, cursor advances, return       │
//!  │    JSON-RPC error     ──► return immediately (no retry/failover)   │
//!  │    transport error    ──► retry, then health unhealthy + switch    │
//!  └────────────────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!  AllProvidersFailed { network, tried, attempts, last_error }
//! ```
//!
//! The rotation cursor outlives individual calls: a success moves it one past the provider
//! that answered, so consecutive calls spread round-robin over the enabled providers.
//! Health is advisory and never skips a provider.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    events::{EventBus, Subscription},
    provider::{
        errors::{RegistryError, RpcError, TransportError},
        health::{HealthMonitor, HealthUpdate, ProviderHealth},
        registry::{Provider, ProviderRegistry},
        transport::{RpcReply, Transport},
    },
    types::{JsonRpcError, JsonRpcRequest, Network},
};

/// Retry and timeout policy of the engine.
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Attempts per provider before failing over (at least 1).
    pub max_attempts: u32,
    /// Sleep before the second attempt.
    pub initial_backoff: Duration,
    /// Growth factor of the sleep for every further attempt.
    pub backoff_multiplier: f64,
    /// Per-attempt timeout.
    pub request_timeout: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 3.0,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FailoverConfig {
    /// Sleep before attempt `attempt` (1-based); zero for the first attempt.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        self.initial_backoff.mul_f64(self.backoff_multiplier.powi(exponent))
    }
}

/// Provider rotation notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailoverEvent {
    /// A provider exhausted its retries and the call moved to the next one.
    ProviderSwitched { network: Network, from: String, to: String, reason: String },
    /// Every enabled provider failed for one call.
    ProvidersExhausted { network: Network, tried: Vec<String>, last_error: String },
    /// The cursor was pinned to a provider.
    ProviderSelected { network: Network, id: String },
    /// The registry changed since the cursor was set; rotation restarts at the first provider.
    RotationReset { network: Network, generation: u64 },
}

/// The provider the next call starts with.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentProviderInfo {
    pub provider: Provider,
    /// Zero-based position in the enabled list.
    pub position: usize,
    pub total: usize,
    pub health: Option<ProviderHealth>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RotationCursor {
    index: usize,
    generation: u64,
}

/// How one provider's attempt loop ended.
enum ProviderOutcome {
    Success(Value),
    Application(JsonRpcError),
    Exhausted(TransportError),
}

/// Retrying, rotating JSON-RPC dispatcher.
pub struct FailoverEngine {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    transport: Arc<dyn Transport>,
    config: FailoverConfig,
    cursor: Mutex<RotationCursor>,
    request_id: AtomicU64,
    events: EventBus<FailoverEvent>,
}

impl FailoverEngine {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthMonitor>,
        transport: Arc<dyn Transport>,
        config: FailoverConfig,
    ) -> Self {
        let cursor = RotationCursor { index: 0, generation: registry.generation() };
        Self {
            registry,
            health,
            transport,
            config: FailoverConfig { max_attempts: config.max_attempts.max(1), ..config },
            cursor: Mutex::new(cursor),
            request_id: AtomicU64::new(1),
            events: EventBus::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Executes `method` with failover.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NoProvidersAvailable`] when the selected network has no enabled provider
    /// - [`RpcError::Application`] when a provider answers with a JSON-RPC error
    /// - [`RpcError::AllProvidersFailed`] when every provider exhausted its retries
    /// - [`RpcError::NetworkChanged`] when the selected network changed mid-call
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.execute(method, params, None).await
    }

    /// Like [`FailoverEngine::call`], aborting in-flight sends and backoff sleeps when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Same as [`FailoverEngine::call`], plus [`RpcError::Cancelled`].
    pub async fn call_with_cancel(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, RpcError> {
        self.execute(method, params, Some(cancel)).await
    }

    async fn execute(
        &self,
        method: &str,
        params: Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, RpcError> {
        let snapshot = self.registry.snapshot();
        let network = snapshot.network;
        if snapshot.providers.is_empty() {
            return Err(RpcError::NoProvidersAvailable { network });
        }

        let mut providers = snapshot.providers;
        let mut generation = snapshot.generation;
        let start = self.start_position(network, generation, providers.len());
        let mut position = start;

        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&JsonRpcRequest::new(method, params, id))
            .map(Bytes::from)
            .map_err(|e| RpcError::Validation(format!("unserializable params: {e}")))?;

        let mut tried: Vec<String> = Vec::with_capacity(providers.len());
        let mut tried_set: HashSet<String> = HashSet::with_capacity(providers.len());
        let mut attempts_total = 0u32;

        loop {
            let provider = providers[position].clone();
            tried.push(provider.id.clone());
            tried_set.insert(provider.id.clone());

            let outcome =
                self.try_provider(&provider, method, &payload, cancel, &mut attempts_total).await?;

            let last_error = match outcome {
                ProviderOutcome::Success(result) => {
                    let index = (position + 1) % providers.len();
                    *self.cursor.lock() = RotationCursor { index, generation };
                    return Ok(result);
                }
                ProviderOutcome::Application(error) => {
                    debug!(
                        provider = %provider.id,
                        method = method,
                        code = error.code,
                        "application error, not retrying"
                    );
                    return Err(RpcError::Application(error));
                }
                ProviderOutcome::Exhausted(error) => error,
            };

            self.health
                .update_health(&provider.id, HealthUpdate::unhealthy(last_error.to_string()));

            let current = self.registry.snapshot();
            if current.network != network {
                warn!(from = %network, to = %current.network, "network changed during request");
                return Err(RpcError::NetworkChanged { from: network, to: current.network });
            }
            if current.generation != generation {
                debug!(
                    old_generation = generation,
                    new_generation = current.generation,
                    "registry changed during request, refreshing candidates"
                );
                let len = current.providers.len();
                position = match current.providers.iter().position(|p| p.id == provider.id) {
                    Some(index) => index,
                    // The failed provider left the list; resume with whatever took its slot.
                    None if len > 0 => (position.min(len) + len - 1) % len,
                    None => 0,
                };
                providers = current.providers;
                generation = current.generation;
            }

            let next = next_untried(&providers, position, &tried_set);
            match next {
                Some(next) => {
                    warn!(
                        network = %network,
                        from = %provider.id,
                        to = %providers[next].id,
                        error = %last_error,
                        "provider failed, switching"
                    );
                    self.events.emit(FailoverEvent::ProviderSwitched {
                        network,
                        from: provider.id.clone(),
                        to: providers[next].id.clone(),
                        reason: last_error.to_string(),
                    });
                    position = next;
                }
                None => {
                    let total = providers.len().max(1);
                    *self.cursor.lock() =
                        RotationCursor { index: (start + 1) % total, generation };

                    error!(
                        network = %network,
                        tried = ?tried,
                        attempts = attempts_total,
                        error = %last_error,
                        "all providers failed"
                    );
                    self.events.emit(FailoverEvent::ProvidersExhausted {
                        network,
                        tried: tried.clone(),
                        last_error: last_error.to_string(),
                    });
                    return Err(RpcError::AllProvidersFailed {
                        network,
                        tried,
                        attempts: attempts_total,
                        last_error,
                    });
                }
            }
        }
    }

    /// Cursor index for a call on `generation`, resetting a stale cursor.
    fn start_position(&self, network: Network, generation: u64, len: usize) -> usize {
        let mut cursor = self.cursor.lock();
        if cursor.generation != generation {
            let was = cursor.index;
            *cursor = RotationCursor { index: 0, generation };
            drop(cursor);
            debug!(network = %network, generation = generation, was = was, "rotation reset");
            self.events.emit(FailoverEvent::RotationReset { network, generation });
            return 0;
        }
        if cursor.index >= len {
            cursor.index = 0;
        }
        cursor.index
    }

    /// Runs the attempt loop against one provider.
    ///
    /// Returns `Err` only for cancellation.
    async fn try_provider(
        &self,
        provider: &Provider,
        method: &str,
        payload: &Bytes,
        cancel: Option<&CancellationToken>,
        attempts_total: &mut u32,
    ) -> Result<ProviderOutcome, RpcError> {
        let mut last_error = TransportError::Timeout;

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                let backoff = self.config.backoff_for(attempt);
                debug!(
                    provider = %provider.id,
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "backing off"
                );
                cancellable(cancel, tokio::time::sleep(backoff)).await?;
            }

            *attempts_total += 1;
            let started = Instant::now();
            let sent = cancellable(
                cancel,
                tokio::time::timeout(
                    self.config.request_timeout,
                    self.transport.send(
                        &provider.url,
                        payload.clone(),
                        self.config.request_timeout,
                    ),
                ),
            )
            .await?;
            let elapsed = started.elapsed();

            let reply = sent
                .unwrap_or(Err(TransportError::Timeout))
                .and_then(|response| response.decode());

            match reply {
                Ok(RpcReply::Success(result)) => {
                    debug!(
                        provider = %provider.id,
                        method = method,
                        attempt = attempt,
                        latency_ms = elapsed.as_millis() as u64,
                        "request succeeded"
                    );
                    self.health.update_health(&provider.id, HealthUpdate::healthy(elapsed));
                    return Ok(ProviderOutcome::Success(result));
                }
                Ok(RpcReply::Error(error)) => {
                    self.health.update_health(&provider.id, HealthUpdate::healthy(elapsed));
                    return Ok(ProviderOutcome::Application(error));
                }
                Err(error) if !error.is_retryable() => {
                    return Err(match error {
                        TransportError::Cancelled => RpcError::Cancelled,
                        other => RpcError::Transport(other),
                    });
                }
                Err(error) => {
                    debug!(
                        provider = %provider.id,
                        method = method,
                        attempt = attempt,
                        max_attempts = self.config.max_attempts,
                        error = %error,
                        "attempt failed"
                    );
                    self.health
                        .update_health(&provider.id, HealthUpdate::unhealthy(error.to_string()));
                    last_error = error;
                }
            }
        }

        Ok(ProviderOutcome::Exhausted(last_error))
    }

    /// Pins the rotation cursor to an enabled provider of the selected network.
    ///
    /// The next call starts there; rotation resumes from it afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the provider is not in the selected network and
    /// [`RegistryError::Validation`] if it is disabled.
    pub fn select_provider(&self, id: &str) -> Result<Provider, RegistryError> {
        let snapshot = self.registry.snapshot();
        let Some(index) = snapshot.providers.iter().position(|p| p.id == id) else {
            return match self.registry.find(id) {
                Some(p) if p.network == snapshot.network => Err(RegistryError::Validation(
                    format!("provider '{id}' is disabled; enable it before selecting it"),
                )),
                _ => Err(RegistryError::NotFound(id.to_string())),
            };
        };

        *self.cursor.lock() = RotationCursor { index, generation: snapshot.generation };
        info!(id = %id, network = %snapshot.network, "provider selected");
        self.events.emit(FailoverEvent::ProviderSelected {
            network: snapshot.network,
            id: id.to_string(),
        });
        Ok(snapshot.providers[index].clone())
    }

    /// The provider the next call will start with, or `None` when nothing is enabled.
    #[must_use]
    pub fn current_provider(&self) -> Option<CurrentProviderInfo> {
        let snapshot = self.registry.snapshot();
        if snapshot.providers.is_empty() {
            return None;
        }
        let cursor = *self.cursor.lock();
        let position = if cursor.generation == snapshot.generation &&
            cursor.index < snapshot.providers.len()
        {
            cursor.index
        } else {
            0
        };
        let provider = snapshot.providers[position].clone();
        let health = self.health.get(&provider.id);
        Some(CurrentProviderInfo { provider, position, total: snapshot.providers.len(), health })
    }

    /// Registers a synchronous failover listener.
    #[must_use = "dropping the subscription detaches the listener immediately"]
    pub fn on_failover_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FailoverEvent) + Send + Sync + 'static,
    {
        self.events.listen(listener)
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FailoverEvent> {
        self.events.subscribe()
    }
}

/// First provider after `position` (wrapping) that has not been tried in this call.
fn next_untried(providers: &[Provider], position: usize, tried: &HashSet<String>) -> Option<usize> {
    let len = providers.len();
    (1..=len)
        .map(|offset| (position + offset) % len)
        .find(|&index| !tried.contains(&providers[index].id))
}

async fn cancellable<F: std::future::Future>(
    cancel: Option<&CancellationToken>,
    future: F,
) -> Result<F::Output, RpcError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(RpcError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}
