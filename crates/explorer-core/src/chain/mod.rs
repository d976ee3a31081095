//! Chain access: typed RPC calls and shared tip tracking.
//!
//! ```text
//!  ChainClient ──► FailoverEngine ──► providers
//!      │
//!      ▼
//!  ChainStatus / Block / Transaction
//!
//!  SyncPoller ──writes──► ChainState ◄──reads── Explorer, CLI
//! ```
//!
//! Blocks reference chunks; transactions live in chunks. A transaction is attributed to the
//! block whose height included its chunk.

pub mod client;
pub mod state;
pub mod types;

pub use client::ChainClient;
pub use state::ChainState;
pub use types::{Block, ChainStatus, ChunkRef, Transaction};
