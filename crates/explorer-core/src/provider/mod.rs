//! RPC provider management and failover.
//!
//! This module handles everything between a logical JSON-RPC call and the wire:
//! - The network-partitioned [`ProviderRegistry`] with durable, versioned persistence
//! - Advisory per-provider health records and explicit probes ([`HealthMonitor`])
//! - The [`Transport`] abstraction and its reqwest-based [`HttpTransport`]
//! - The [`FailoverEngine`] that retries transport failures with backoff and rotates across
//!   enabled providers
//!
//! # Error Classification
//!
//! The engine is the only component that decides whether to retry:
//!
//! ```text
//! response ──► JSON-RPC `error` object? ──► yes ──► RpcError::Application (returned as-is)
//!                 │
//!                 no
//!                 ▼
//!           2xx with `result`? ──► yes ──► success
//!                 │
//!                 no ──► TransportError (retried, then failed over)
//! ```

pub mod defaults;
pub mod errors;
pub mod failover;
pub mod health;
pub mod registry;
pub mod storage;
pub mod transport;

pub use errors::{RegistryError, RpcError, StorageError, TransportError};
pub use failover::{CurrentProviderInfo, FailoverConfig, FailoverEngine, FailoverEvent};
pub use health::{HealthChecker, HealthMonitor, HealthUpdate, ProviderHealth};
pub use registry::{
    MoveDirection, Provider, ProviderRegistry, RegistryChange, RegistryEvent, RegistrySnapshot,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{HttpTransport, HttpTransportConfig, RpcReply, Transport, TransportResponse};
