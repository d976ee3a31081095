//! Windowed transaction sync.
//!
//! ```text
//!  first activation:   (latest - window, latest]
//!  later activations:  (cursor, latest]
//!
//!  range ──► batches of `concurrency` heights ──► block (cache-first) ──► chunk per new chunk
//!                │                                                            │
//!                └──── inter-batch delay ◄──── merge + cursor advance ◄───────┘
//! ```
//!
//! The cursor only moves through the contiguous prefix of heights that were actually
//! scanned. A height the node reports as unknown counts as scanned with no transactions.
//! Every merge and cursor move checks the sync epoch, which [`IncrementalSync::reset`]
//! bumps, so results fetched for a previous network are never merged.

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::{BlockCache, MergeOutcome, TransactionCache},
    chain::{Block, ChainClient, ChainState, Transaction},
    provider::RpcError,
    types::{BlockId, BlockRange},
};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Heights covered by the first activation.
    pub window: u64,
    /// Heights fetched in parallel per batch.
    pub concurrency: usize,
    /// Longest range [`IncrementalSync::transactions_in_range`] accepts.
    pub max_range: u64,
    pub batch_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window: 10,
            concurrency: 2,
            max_range: 1000,
            batch_delay: Duration::from_millis(250),
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// Highest height whose transactions have been merged, with everything below it either
/// merged too or outside the initial window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCursor {
    last_processed_height: Option<u64>,
}

impl SyncCursor {
    #[must_use]
    pub fn last_processed_height(&self) -> Option<u64> {
        self.last_processed_height
    }

    /// Moves the cursor to `height`. Returns `false` and leaves it untouched if that would
    /// move it backwards.
    pub fn advance_to(&mut self, height: u64) -> bool {
        match self.last_processed_height {
            Some(current) if current >= height => false,
            _ => {
                self.last_processed_height = Some(height);
                true
            }
        }
    }

    /// Range the next activation must scan to reach `latest`.
    #[must_use]
    pub fn next_range(&self, latest: u64, window: u64) -> Option<BlockRange> {
        match self.last_processed_height {
            Some(cursor) => BlockRange::after(cursor, latest),
            None => BlockRange::after(latest.saturating_sub(window), latest),
        }
    }
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStop {
    Completed,
    Cancelled,
    /// The caches were reset while the scan was running; later results were discarded.
    Superseded,
}

/// What one pass over a range fetched and merged.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub range: BlockRange,
    /// Heights scanned successfully, including unknown heights.
    pub scanned: usize,
    /// Transactions found, ascending by block height.
    pub transactions: Vec<Transaction>,
    pub failed_heights: Vec<u64>,
    pub merge: MergeOutcome,
    pub stop: ScanStop,
}

impl ScanReport {
    fn new(range: BlockRange) -> Self {
        Self {
            range,
            scanned: 0,
            transactions: Vec::new(),
            failed_heights: Vec::new(),
            merge: MergeOutcome::default(),
            stop: ScanStop::Completed,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stop == ScanStop::Completed && self.failed_heights.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another sync holds the gate.
    Busy,
    UpToDate { cursor: Option<u64> },
    Synced { report: ScanReport, cursor: Option<u64> },
}

#[derive(Default)]
struct SyncState {
    cursor: SyncCursor,
    epoch: u64,
}

/// Owns the block and transaction caches together with the cursor that drives them.
pub struct IncrementalSync {
    client: ChainClient,
    blocks: Arc<BlockCache>,
    transactions: Arc<TransactionCache>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    gate: tokio::sync::Mutex<()>,
}

impl IncrementalSync {
    #[must_use]
    pub fn new(
        client: ChainClient,
        blocks: Arc<BlockCache>,
        transactions: Arc<TransactionCache>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            blocks,
            transactions,
            config,
            state: Mutex::new(SyncState::default()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn blocks(&self) -> &Arc<BlockCache> {
        &self.blocks
    }

    #[must_use]
    pub fn transactions(&self) -> &Arc<TransactionCache> {
        &self.transactions
    }

    #[must_use]
    pub fn cursor(&self) -> SyncCursor {
        self.state.lock().cursor
    }

    /// True while a sync holds the gate.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Clears both caches and the cursor. In-flight scans stop merging.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.cursor = SyncCursor::default();
        self.transactions.clear();
        self.blocks.clear();
        info!(epoch = state.epoch, "sync state reset");
    }

    /// Cache-first block lookup. A miss fetches once and caches the block permanently.
    ///
    /// # Errors
    ///
    /// Propagates [`ChainClient::block`] errors.
    pub async fn block(
        &self,
        id: &BlockId,
        cancel: &CancellationToken,
    ) -> Result<Arc<Block>, RpcError> {
        if let Some(block) = self.blocks.get(id) {
            return Ok(block);
        }
        let epoch = self.state.lock().epoch;
        let block = self.client.block(id, Some(cancel)).await?;
        Ok(self.cache_block(epoch, block))
    }

    /// Latest final block, always fetched and then cached.
    ///
    /// # Errors
    ///
    /// Propagates [`ChainClient::latest_block`] errors.
    pub async fn latest_block(&self, cancel: &CancellationToken) -> Result<Arc<Block>, RpcError> {
        let epoch = self.state.lock().epoch;
        let block = self.client.latest_block(Some(cancel)).await?;
        Ok(self.cache_block(epoch, block))
    }

    fn cache_block(&self, epoch: u64, block: Block) -> Arc<Block> {
        let state = self.state.lock();
        if state.epoch == epoch {
            self.blocks.insert(block)
        } else {
            Arc::new(block)
        }
    }

    /// Scans from the cursor (or the initial window) up to `latest`.
    ///
    /// Returns [`SyncOutcome::Busy`] without waiting if another sync is running.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoProvidersAvailable`] or [`RpcError::NetworkChanged`] when no
    /// further height can succeed. Per-height failures are reported in the scan report.
    pub async fn sync_to(
        &self,
        latest: u64,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, RpcError> {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!(latest = latest, "sync already running");
            return Ok(SyncOutcome::Busy);
        };

        let (epoch, range) = {
            let mut state = self.state.lock();
            let range = state.cursor.next_range(latest, self.config.window);
            if let (None, Some(range)) = (state.cursor.last_processed_height(), range) {
                state.cursor.advance_to(range.from - 1);
            }
            (state.epoch, range)
        };

        let Some(range) = range else {
            return Ok(SyncOutcome::UpToDate { cursor: self.cursor().last_processed_height() });
        };

        let report = self.scan(range, epoch, true, cancel).await?;
        let cursor = self.cursor().last_processed_height();
        info!(
            range = %report.range,
            scanned = report.scanned,
            transactions = report.transactions.len(),
            failed = report.failed_heights.len(),
            cursor = ?cursor,
            "sync pass finished"
        );
        Ok(SyncOutcome::Synced { report, cursor })
    }

    /// Scans an arbitrary inclusive range and merges what it finds. The cursor is not
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Validation`] for an empty range or one longer than
    /// [`SyncConfig::max_range`], before any request is sent. Otherwise the same as
    /// [`IncrementalSync::sync_to`].
    pub async fn transactions_in_range(
        &self,
        range: BlockRange,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, RpcError> {
        if range.is_empty() {
            return Err(RpcError::Validation(format!("empty block range {range}")));
        }
        if range.len() > self.config.max_range {
            return Err(RpcError::Validation(format!(
                "block range {range} spans {} heights, at most {} allowed",
                range.len(),
                self.config.max_range
            )));
        }
        let epoch = self.state.lock().epoch;
        self.scan(range, epoch, false, cancel).await
    }

    async fn scan(
        &self,
        range: BlockRange,
        epoch: u64,
        advance_cursor: bool,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, RpcError> {
        let step = u64::try_from(self.config.concurrency.max(1)).unwrap_or(u64::MAX);
        let mut report = ScanReport::new(range);
        let mut succeeded = BTreeSet::new();
        let mut next_expected = Some(range.from);
        let mut batch_from = Some(range.from);

        while let Some(from) = batch_from.filter(|&h| h <= range.to) {
            let to = from.saturating_add(step - 1).min(range.to);
            batch_from = to.checked_add(1);

            if from > range.from && !self.config.batch_delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.config.batch_delay) => {}
                    () = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                report.stop = ScanStop::Cancelled;
                break;
            }

            let results = join_all((from..=to).map(|height| async move {
                (height, self.scan_height(height, epoch, cancel).await)
            }))
            .await;

            let mut found = Vec::new();
            let mut fatal = None;
            for (height, result) in results {
                match result {
                    Ok(txs) => {
                        succeeded.insert(height);
                        found.extend(txs);
                    }
                    Err(RpcError::Cancelled) => report.stop = ScanStop::Cancelled,
                    Err(
                        e @ (RpcError::NoProvidersAvailable { .. }
                        | RpcError::NetworkChanged { .. }),
                    ) => {
                        fatal = Some(e);
                    }
                    Err(e) => {
                        warn!(height = height, error = %e, "failed to scan height");
                        report.failed_heights.push(height);
                    }
                }
            }
            found.sort_by_key(|tx| tx.block_height);

            {
                let mut state = self.state.lock();
                if state.epoch != epoch {
                    report.stop = ScanStop::Superseded;
                    break;
                }
                report.merge.absorb(self.transactions.merge(found.iter().cloned()));
                report.scanned = succeeded.len();
                report.transactions.extend(found);

                if advance_cursor {
                    let mut contiguous = None;
                    while let Some(height) = next_expected.filter(|h| succeeded.contains(h)) {
                        contiguous = Some(height);
                        next_expected = height.checked_add(1);
                    }
                    if let Some(height) = contiguous {
                        state.cursor.advance_to(height);
                    }
                }
            }

            if let Some(error) = fatal {
                return Err(error);
            }
            if report.stop != ScanStop::Completed {
                break;
            }
        }

        report.failed_heights.sort_unstable();
        Ok(report)
    }

    async fn scan_height(
        &self,
        height: u64,
        epoch: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Transaction>, RpcError> {
        let id = BlockId::Height(height);
        let block = match self.blocks.get(&id) {
            Some(block) => block,
            None => match self.client.block(&id, Some(cancel)).await {
                Ok(block) => self.cache_block(epoch, block),
                Err(e) if e.is_unknown_block() => {
                    debug!(height = height, "height unknown to node, treating as empty");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            },
        };

        let mut transactions = Vec::new();
        for chunk in block.new_chunks() {
            transactions.extend(self.client.chunk_transactions(&block, chunk, Some(cancel)).await?);
        }
        Ok(transactions)
    }
}

/// Periodically reads the chain tip and syncs when it moved past the cursor.
pub struct SyncPoller {
    client: ChainClient,
    sync: Arc<IncrementalSync>,
    chain_state: Arc<ChainState>,
    poll_interval: Duration,
}

impl SyncPoller {
    #[must_use]
    pub fn new(
        client: ChainClient,
        sync: Arc<IncrementalSync>,
        chain_state: Arc<ChainState>,
        poll_interval: Duration,
    ) -> Self {
        Self { client, sync, chain_state, poll_interval }
    }

    /// One poll: read `status`, record the tip, then sync if the tip is past the cursor.
    ///
    /// # Errors
    ///
    /// Propagates the `status` call error and [`IncrementalSync::sync_to`] errors.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<SyncOutcome, RpcError> {
        let status = self.client.status(Some(cancel)).await?;
        let latest = status.latest_block_height;
        self.chain_state.update_tip(latest, &status.latest_block_hash);

        let cursor = self.sync.cursor().last_processed_height();
        if cursor.is_some_and(|c| latest <= c) {
            return Ok(SyncOutcome::UpToDate { cursor });
        }
        self.sync.sync_to(latest, cancel).await
    }

    /// Spawns the polling loop; it exits when `shutdown` is cancelled.
    #[must_use]
    pub fn start_with_shutdown(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.poll_once(&shutdown).await {
                            Ok(SyncOutcome::Synced { report, cursor }) => debug!(
                                range = %report.range,
                                new = report.merge.inserted,
                                cursor = ?cursor,
                                "poll synced"
                            ),
                            Ok(_) => {}
                            Err(RpcError::Cancelled) => {}
                            Err(e) => warn!(error = %e, "sync poll failed"),
                        }
                    }
                    () = shutdown.cancelled() => {
                        info!("sync poller shutting down");
                        break;
                    }
                }
            }
        })
    }
}
