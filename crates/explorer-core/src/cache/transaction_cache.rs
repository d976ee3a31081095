use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{cache::CacheStats, chain::Transaction, types::BlockRange};

/// Errors that can occur during transaction cache construction.
#[derive(Debug, Error)]
pub enum TransactionCacheError {
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCacheConfig {
    /// Number of newest transactions (by block height) retained after each merge.
    pub max_transactions: usize,
}

impl Default for TransactionCacheConfig {
    fn default() -> Self {
        Self { max_transactions: 500 }
    }
}

/// Result of one [`TransactionCache::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub replaced: usize,
    pub evicted: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.evicted += other.evicted;
    }
}

#[derive(Default)]
struct TransactionCacheInner {
    by_hash: HashMap<String, Arc<Transaction>>,
    /// `(block_height, hash)` for every cached transaction, oldest first.
    order: BTreeSet<(u64, String)>,
}

impl TransactionCacheInner {
    fn remove(&mut self, hash: &str) -> Option<Arc<Transaction>> {
        let removed = self.by_hash.remove(hash)?;
        self.order.remove(&(removed.block_height, removed.hash.clone()));
        Some(removed)
    }
}

/// Bounded, hash-deduplicated set of recent transactions.
///
/// A merge is a union by hash where the incoming copy wins, followed by truncation to the
/// newest `max_transactions` by block height. Both steps happen under one write lock, so
/// merges are idempotent and the order in which batches arrive does not change the result.
pub struct TransactionCache {
    max_transactions: usize,
    inner: RwLock<TransactionCacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TransactionCache {
    /// # Errors
    ///
    /// Returns [`TransactionCacheError::InvalidConfig`] if `max_transactions` is zero.
    pub fn new(config: &TransactionCacheConfig) -> Result<Self, TransactionCacheError> {
        if config.max_transactions == 0 {
            return Err(TransactionCacheError::InvalidConfig(
                "max_transactions must be greater than 0".into(),
            ));
        }
        Ok(Self {
            max_transactions: config.max_transactions,
            inner: RwLock::new(TransactionCacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn max_transactions(&self) -> usize {
        self.max_transactions
    }

    pub fn merge<I>(&self, transactions: I) -> MergeOutcome
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut outcome = MergeOutcome::default();
        let mut inner = self.inner.write();

        for tx in transactions {
            if inner.remove(&tx.hash).is_some() {
                outcome.replaced += 1;
            } else {
                outcome.inserted += 1;
            }
            inner.order.insert((tx.block_height, tx.hash.clone()));
            inner.by_hash.insert(tx.hash.clone(), Arc::new(tx));
        }

        while inner.by_hash.len() > self.max_transactions {
            let Some((_, hash)) = inner.order.pop_first() else { break };
            inner.by_hash.remove(&hash);
            outcome.evicted += 1;
        }
        drop(inner);

        self.evictions.fetch_add(outcome.evicted as u64, Ordering::Relaxed);
        trace!(
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            evicted = outcome.evicted,
            "merged transactions"
        );
        outcome
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<Arc<Transaction>> {
        let found = self.inner.read().by_hash.get(hash).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Up to `limit` transactions, newest block first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Arc<Transaction>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|(_, hash)| inner.by_hash.get(hash).cloned())
            .collect()
    }

    /// Cached transactions whose block falls inside `range`, newest block first.
    #[must_use]
    pub fn in_range(&self, range: &BlockRange) -> Vec<Arc<Transaction>> {
        let inner = self.inner.read();
        let start = (range.from, String::new());
        let mut found: Vec<_> = inner
            .order
            .range(start..)
            .take_while(|(height, _)| *height <= range.to)
            .filter_map(|(_, hash)| inner.by_hash.get(hash).cloned())
            .collect();
        found.reverse();
        found
    }

    /// Lowest and highest block heights currently represented.
    #[must_use]
    pub fn height_span(&self) -> Option<(u64, u64)> {
        let inner = self.inner.read();
        let low = inner.order.first()?.0;
        let high = inner.order.last()?.0;
        Some((low, high))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let removed = inner.by_hash.len();
        inner.by_hash.clear();
        inner.order.clear();
        debug!(removed = removed, "transaction cache cleared");
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.max_transactions,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
