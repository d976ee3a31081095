use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    chain::types::{Block, BlockView, ChainStatus, ChunkRef, ChunkView, StatusView, Transaction},
    provider::{FailoverEngine, RpcError},
    types::BlockId,
};

/// Typed `status`, `block` and `chunk` calls routed through the failover engine.
#[derive(Clone)]
pub struct ChainClient {
    engine: Arc<FailoverEngine>,
}

impl ChainClient {
    #[must_use]
    pub fn new(engine: Arc<FailoverEngine>) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<FailoverEngine> {
        &self.engine
    }

    async fn call<T: DeserializeOwned>(
        &self,
        what: &'static str,
        method: &str,
        params: Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, RpcError> {
        let result = match cancel {
            Some(token) => self.engine.call_with_cancel(method, params, token).await?,
            None => self.engine.call(method, params).await?,
        };
        serde_json::from_value(result).map_err(|e| RpcError::decode(what, e))
    }

    /// # Errors
    ///
    /// Propagates failover errors and [`RpcError::Decode`] for unexpected result shapes.
    pub async fn status(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<ChainStatus, RpcError> {
        let view: StatusView = self.call("status", "status", json!([]), cancel).await?;
        Ok(view.into())
    }

    /// # Errors
    ///
    /// Propagates failover errors; an unknown height surfaces as an application error whose
    /// cause is `UNKNOWN_BLOCK`.
    pub async fn block(
        &self,
        id: &BlockId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Block, RpcError> {
        let view: BlockView =
            self.call("block", "block", json!({ "block_id": id.to_param() }), cancel).await?;
        Ok(view.into())
    }

    /// Latest final block.
    ///
    /// # Errors
    ///
    /// Propagates failover errors.
    pub async fn latest_block(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<Block, RpcError> {
        let view: BlockView =
            self.call("block", "block", json!({ "finality": "final" }), cancel).await?;
        Ok(view.into())
    }

    /// Transactions of `chunk`, attributed to `block`.
    ///
    /// # Errors
    ///
    /// Propagates failover errors.
    pub async fn chunk_transactions(
        &self,
        block: &Block,
        chunk: &ChunkRef,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Transaction>, RpcError> {
        let view: ChunkView = self
            .call("chunk", "chunk", json!({ "chunk_id": chunk.chunk_hash }), cancel)
            .await?;
        Ok(view.transactions.into_iter().map(|tx| tx.into_transaction(block, chunk)).collect())
    }
}
