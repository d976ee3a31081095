//! Chain entities and their JSON-RPC wire views.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node status as reported by the `status` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub chain_id: String,
    pub latest_block_height: u64,
    pub latest_block_hash: String,
    pub latest_block_time: String,
    pub syncing: bool,
    pub protocol_version: u32,
    pub node_version: String,
}

/// Reference from a block to one of its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub chunk_hash: String,
    pub shard_id: u64,
    pub height_included: u64,
}

/// A block. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    /// Nanoseconds since the unix epoch.
    pub timestamp: u64,
    pub author: String,
    pub chunks: Vec<ChunkRef>,
}

impl Block {
    #[must_use]
    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        let nanos = i64::try_from(self.timestamp).unwrap_or(i64::MAX);
        Utc.timestamp_nanos(nanos)
    }

    /// Chunks produced at this height.
    ///
    /// Shards that missed the block repeat an older chunk whose transactions belong to an
    /// earlier height.
    pub fn new_chunks(&self) -> impl Iterator<Item = &ChunkRef> {
        self.chunks.iter().filter(move |c| c.height_included == self.height)
    }
}

/// A transaction, identified by its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub signer_id: String,
    pub receiver_id: String,
    pub nonce: u64,
    pub actions: Vec<Value>,
    pub block_height: u64,
    pub block_hash: String,
    pub chunk_hash: String,
    pub shard_id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusView {
    chain_id: String,
    #[serde(default)]
    protocol_version: u32,
    #[serde(default)]
    version: VersionView,
    sync_info: SyncInfoView,
}

#[derive(Debug, Default, Deserialize)]
struct VersionView {
    #[serde(default)]
    version: String,
    #[serde(default)]
    build: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfoView {
    latest_block_height: u64,
    latest_block_hash: String,
    #[serde(default)]
    latest_block_time: String,
    #[serde(default)]
    syncing: bool,
}

impl From<StatusView> for ChainStatus {
    fn from(view: StatusView) -> Self {
        let node_version = if view.version.build.is_empty() {
            view.version.version
        } else {
            format!("{} ({})", view.version.version, view.version.build)
        };
        Self {
            chain_id: view.chain_id,
            latest_block_height: view.sync_info.latest_block_height,
            latest_block_hash: view.sync_info.latest_block_hash,
            latest_block_time: view.sync_info.latest_block_time,
            syncing: view.sync_info.syncing,
            protocol_version: view.protocol_version,
            node_version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockView {
    #[serde(default)]
    author: String,
    header: BlockHeaderView,
    #[serde(default)]
    chunks: Vec<ChunkHeaderView>,
}

#[derive(Debug, Deserialize)]
struct BlockHeaderView {
    height: u64,
    hash: String,
    #[serde(default)]
    prev_hash: String,
    #[serde(default)]
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct ChunkHeaderView {
    chunk_hash: String,
    #[serde(default)]
    shard_id: u64,
    #[serde(default)]
    height_included: Option<u64>,
}

impl From<BlockView> for Block {
    fn from(view: BlockView) -> Self {
        let height = view.header.height;
        Self {
            height,
            hash: view.header.hash,
            prev_hash: view.header.prev_hash,
            timestamp: view.header.timestamp,
            author: view.author,
            chunks: view
                .chunks
                .into_iter()
                .map(|c| ChunkRef {
                    chunk_hash: c.chunk_hash,
                    shard_id: c.shard_id,
                    height_included: c.height_included.unwrap_or(height),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkView {
    #[serde(default)]
    pub(crate) transactions: Vec<TransactionView>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionView {
    hash: String,
    signer_id: String,
    receiver_id: String,
    #[serde(default)]
    nonce: u64,
    #[serde(default)]
    actions: Vec<Value>,
}

impl TransactionView {
    pub(crate) fn into_transaction(self, block: &Block, chunk: &ChunkRef) -> Transaction {
        Transaction {
            hash: self.hash,
            signer_id: self.signer_id,
            receiver_id: self.receiver_id,
            nonce: self.nonce,
            actions: self.actions,
            block_height: block.height,
            block_hash: block.hash.clone(),
            chunk_hash: chunk.chunk_hash.clone(),
            shard_id: chunk.shard_id,
        }
    }
}
