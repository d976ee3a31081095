//! Runtime lifecycle management including background tasks and graceful shutdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{config::AppConfig, explorer::Explorer, provider::HealthChecker};

use super::builder::ExplorerRuntimeBuilder;

/// Owns the explorer and its background tasks.
///
/// Every task watches one [`CancellationToken`]; [`ExplorerRuntime::shutdown`] cancels it
/// and waits for the tasks to finish.
pub struct ExplorerRuntime {
    explorer: Arc<Explorer>,
    config: AppConfig,
    shutdown: CancellationToken,
    health_task: Option<JoinHandle<()>>,
    sync_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ExplorerRuntime {
    #[must_use]
    pub fn builder() -> ExplorerRuntimeBuilder {
        ExplorerRuntimeBuilder::new()
    }

    pub(super) fn new(
        explorer: Arc<Explorer>,
        config: AppConfig,
        enable_health_checker: bool,
        enable_sync_poller: bool,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let health_task = enable_health_checker.then(|| {
            let checker = HealthChecker::new(
                explorer.health().clone(),
                explorer.registry().clone(),
                config.health_check_interval(),
            );
            let handle = checker.start_with_shutdown(shutdown.child_token());
            debug!("Health checker task started");
            handle
        });

        let sync_task = enable_sync_poller.then(|| {
            let handle = explorer.poller().start_with_shutdown(shutdown.child_token());
            debug!("Sync poller task started");
            handle
        });

        Self {
            explorer,
            config,
            shutdown,
            health_task,
            sync_task,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn explorer(&self) -> &Arc<Explorer> {
        &self.explorer
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn has_health_checker(&self) -> bool {
        self.health_task.is_some()
    }

    #[must_use]
    pub fn has_sync_poller(&self) -> bool {
        self.sync_task.is_some()
    }

    /// Token cancelled when the runtime shuts down, for tasks spawned by the embedder.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancels every background task and waits for them to exit.
    pub async fn shutdown(self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating explorer runtime shutdown");
        self.shutdown.cancel();

        let tasks = [("health checker", self.health_task), ("sync poller", self.sync_task)];
        for (name, task) in tasks {
            let Some(task) = task else { continue };
            match task.await {
                Ok(()) => debug!(task = name, "Background task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Background task cancelled"),
                Err(e) => error!(task = name, error = %e, "Background task failed"),
            }
        }

        info!("Explorer runtime shutdown complete");
    }

    /// Waits until `signal` completes or the runtime token is cancelled, then shuts down.
    pub async fn run_until<F>(self, signal: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            () = signal => info!("Shutdown signal received"),
            () = self.shutdown.cancelled() => {}
        }
        self.shutdown().await;
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<ExplorerRuntime>;
    let _ = assert_sync::<ExplorerRuntime>;
};
