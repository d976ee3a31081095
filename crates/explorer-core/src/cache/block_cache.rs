use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{cache::CacheStats, chain::Block, types::BlockId};

/// Errors that can occur during block cache construction.
#[derive(Debug, Error)]
pub enum BlockCacheError {
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockCacheConfig {
    /// Maximum number of blocks kept; the lowest heights are evicted first.
    pub capacity: usize,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

#[derive(Default)]
struct BlockCacheInner {
    by_height: BTreeMap<u64, Arc<Block>>,
    by_hash: HashMap<String, u64>,
}

/// Permanent store for fetched blocks, addressable by height or hash.
///
/// Blocks never change once produced, so entries are never refreshed. They only leave the
/// cache through capacity eviction or [`BlockCache::clear`].
pub struct BlockCache {
    capacity: usize,
    inner: RwLock<BlockCacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    /// # Errors
    ///
    /// Returns [`BlockCacheError::InvalidConfig`] if `capacity` is zero.
    pub fn new(config: &BlockCacheConfig) -> Result<Self, BlockCacheError> {
        if config.capacity == 0 {
            return Err(BlockCacheError::InvalidConfig("capacity must be greater than 0".into()));
        }
        Ok(Self {
            capacity: config.capacity,
            inner: RwLock::new(BlockCacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn get(&self, id: &BlockId) -> Option<Arc<Block>> {
        let found = {
            let inner = self.inner.read();
            match id {
                BlockId::Height(height) => inner.by_height.get(height).cloned(),
                BlockId::Hash(hash) => {
                    inner.by_hash.get(hash).and_then(|h| inner.by_height.get(h)).cloned()
                }
            }
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(block = %id, "block cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(block = %id, "block cache miss");
        }
        found
    }

    /// Stores `block` and returns the cached copy.
    ///
    /// If the height is already cached the existing entry wins and is returned.
    pub fn insert(&self, block: Block) -> Arc<Block> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_height.get(&block.height) {
            return Arc::clone(existing);
        }

        let block = Arc::new(block);
        inner.by_hash.insert(block.hash.clone(), block.height);
        inner.by_height.insert(block.height, Arc::clone(&block));

        while inner.by_height.len() > self.capacity {
            let Some((height, evicted)) = inner.by_height.pop_first() else { break };
            inner.by_hash.remove(&evicted.hash);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(height = height, "evicted block");
        }
        Arc::clone(&block)
    }

    #[must_use]
    pub fn contains(&self, height: u64) -> bool {
        self.inner.read().by_height.contains_key(&height)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_height.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest cached height.
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        self.inner.read().by_height.keys().next_back().copied()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let removed = inner.by_height.len();
        inner.by_height.clear();
        inner.by_hash.clear();
        debug!(removed = removed, "block cache cleared");
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
