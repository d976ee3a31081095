//! Block and transaction caches plus the incremental sync that fills them.
//!
//! # Cache Components
//!
//! - [`BlockCache`]: blocks by height and hash, kept until capacity eviction
//! - [`TransactionCache`]: newest `K` transactions, deduplicated by hash
//! - [`IncrementalSync`]: cursor-driven windowed scans that feed both caches
//! - [`SyncPoller`]: periodic tip check that triggers a sync when the tip moves

pub mod block_cache;
pub mod sync;
pub mod transaction_cache;

use serde::Serialize;

pub use block_cache::{BlockCache, BlockCacheConfig, BlockCacheError};
pub use sync::{
    IncrementalSync, ScanReport, ScanStop, SyncConfig, SyncCursor, SyncOutcome, SyncPoller,
};
pub use transaction_cache::{
    MergeOutcome, TransactionCache, TransactionCacheConfig, TransactionCacheError,
};

/// Point-in-time counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or `None` before the first lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}
