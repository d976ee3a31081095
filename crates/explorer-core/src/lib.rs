//! # Explorer Core
//!
//! Resilient multi-provider JSON-RPC access layer for a chain explorer.
//!
//! This crate provides the building blocks a UI needs to read chain data through a set of
//! interchangeable, possibly unreliable RPC endpoints:
//!
//! - **[`provider`]**: the network-partitioned provider registry with durable persistence,
//!   advisory health tracking, the HTTP transport, and the failover execution engine that
//!   retries transport failures with backoff and rotates across providers.
//!
//! - **[`cache`]**: immutable block cache, bounded transaction cache, and the windowed sync
//!   that folds new chain height into the transaction cache exactly once.
//!
//! - **[`chain`]**: typed `status` / `block` / `chunk` calls and shared tip tracking.
//!
//! - **[`explorer`]**: the query surface exposed to the UI layer.
//!
//! - **[`runtime`]**: assembles every component from an [`config::AppConfig`] and owns the
//!   background tasks.
//!
//! ## Request Flow
//!
//! ```text
//! UI query
//!    │
//!    ▼
//! ┌──────────────┐   hit    ┌─────────────┐
//! │   Explorer   │ ───────► │ BlockCache  │
//! └──────┬───────┘          └─────────────┘
//!        │ miss / sync
//!        ▼
//! ┌──────────────┐
//! │ ChainClient  │  status / block / chunk
//! └──────┬───────┘
//!        ▼
//! ┌──────────────────┐  snapshot  ┌──────────────────┐
//! │  FailoverEngine  │ ─────────► │ ProviderRegistry │
//! │ retry + rotation │            └──────────────────┘
//! └──────┬───────────┘
//!        │ every attempt            ┌───────────────┐
//!        ├─────────────────────────►│ HealthMonitor │
//!        ▼                          └───────────────┘
//!   Transport (HTTP / proxy)
//! ```

pub mod cache;
pub mod chain;
pub mod config;
pub mod events;
pub mod explorer;
pub mod provider;
pub mod runtime;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::AppConfig;
pub use explorer::Explorer;
pub use provider::{
    FailoverEngine, HealthMonitor, Provider, ProviderHealth, ProviderRegistry, RpcError,
    TransportError,
};
pub use runtime::{ExplorerRuntime, ExplorerRuntimeBuilder};
pub use types::{BlockId, BlockRange, Network};
