//! Mock Infrastructure for Testing the Explorer Access Layer
//!
//! This module provides reusable mock types for exercising the explorer against real HTTP
//! endpoints without network access.
//!
//! ## Components
//!
//! - `RpcMockBuilder`: Wraps mockito to serve `status`, `block` and `chunk` responses
//! - Test helpers that wire an `Explorer` to mock endpoints through `HttpTransport`
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{http_explorer, fast_settings, RpcMockBuilder};
//!
//! let mut mock = RpcMockBuilder::new().await;
//! mock.mock_status(100).mock_block(100, 1);
//!
//! let (explorer, _) = http_explorer(&[&mock.url()], fast_settings());
//! ```

pub mod rpc_mock;
pub mod test_helpers;

pub use rpc_mock::RpcMockBuilder;
pub use test_helpers::*;
