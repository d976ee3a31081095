//! Shared chain tip tracking.
//!
//! `ChainState` holds the latest height observed on the selected network. The sync poller
//! writes it; the explorer facade and the CLI read it.

use arc_swap::ArcSwap;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::trace;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ChainTip {
    height: u64,
    hash: String,
}

/// Latest observed chain tip.
///
/// Reads are wait-free. Writes use compare-and-swap so concurrent updates never move the
/// tip backwards.
#[derive(Debug)]
pub struct ChainState {
    tip: ArcSwap<ChainTip>,
    /// Unix timestamp (seconds) of the last tip update.
    last_tip_update: AtomicU64,
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tip: ArcSwap::from_pointee(ChainTip::default()),
            last_tip_update: AtomicU64::new(0),
        }
    }

    /// Latest observed height; `0` before the first observation.
    #[inline]
    #[must_use]
    pub fn current_tip(&self) -> u64 {
        self.tip.load().height
    }

    #[must_use]
    pub fn current_tip_with_hash(&self) -> (u64, String) {
        let tip = self.tip.load();
        (tip.height, tip.hash.clone())
    }

    /// Seconds since the tip last moved, or `None` if it never did.
    #[must_use]
    pub fn tip_age_seconds(&self) -> Option<u64> {
        match self.last_tip_update.load(Ordering::Acquire) {
            0 => None,
            last => Some(current_unix_timestamp().saturating_sub(last)),
        }
    }

    /// Moves the tip forward. Returns `false` if `height` is not above the current tip.
    pub fn update_tip(&self, height: u64, hash: &str) -> bool {
        let new_tip = Arc::new(ChainTip { height, hash: hash.to_string() });
        let mut updated = false;
        self.tip.rcu(|current| {
            if height > current.height {
                updated = true;
                Arc::clone(&new_tip)
            } else {
                updated = false;
                Arc::clone(current)
            }
        });

        if updated {
            self.last_tip_update.store(current_unix_timestamp(), Ordering::Release);
            trace!(height = height, "chain tip updated");
        }
        updated
    }

    /// Forgets the tip, e.g. after switching networks.
    pub fn reset(&self) {
        self.tip.store(Arc::new(ChainTip::default()));
        self.last_tip_update.store(0, Ordering::Release);
        trace!("chain tip reset");
    }
}
