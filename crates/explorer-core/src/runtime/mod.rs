//! Explorer runtime initialization and lifecycle management.
//!
//! Assembles the provider registry, transport and [`Explorer`](crate::explorer::Explorer)
//! from an [`AppConfig`](crate::config::AppConfig) and runs the two background tasks: the
//! health checker and the sync poller.
//!
//! # Examples
//!
//! ```no_run
//! use explorer_core::{config::AppConfig, runtime::ExplorerRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ExplorerRuntime::builder().with_config(AppConfig::load()?).build()?;
//!
//!     for tx in runtime.explorer().recent_transactions(10) {
//!         println!("{} {} -> {}", tx.hash, tx.signer_id, tx.receiver_id);
//!     }
//!
//!     runtime.run_until(async { tokio::signal::ctrl_c().await.unwrap_or(()) }).await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod lifecycle;

pub use builder::{ExplorerRuntimeBuilder, RuntimeError};
pub use lifecycle::ExplorerRuntime;
