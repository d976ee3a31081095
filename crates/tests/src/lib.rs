//! Integration Tests for the Explorer RPC Access Layer
//!
//! This crate contains various test modules:
//!
//! - `failover_tests`: Retry, rotation and error classification against mock HTTP endpoints
//! - `sync_tests`: Windowed sync, range scans and cache population over HTTP
//! - `transport_tests`: Proxy forwarding and response decoding of the reqwest transport
//! - `registry_tests`: Provider registry persistence on a `FileStore`
//! - `runtime_tests`: Runtime assembled from a config file, with the sync poller running
//! - `mock_infrastructure`: Reusable mockito wrappers and explorer builders
//!
//! ## Running Tests
//!
//! No external services are needed; every endpoint is a local mockito server.
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod failover_tests;

#[cfg(test)]
mod sync_tests;

#[cfg(test)]
mod transport_tests;

#[cfg(test)]
mod registry_tests;

#[cfg(test)]
mod runtime_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
