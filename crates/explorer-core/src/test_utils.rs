//! Scripted transport and chain fixtures for tests.
//!
//! [`MockTransport`] answers each request from, in order:
//! 1. the per-URL queue filled by [`MockTransport::push`]
//! 2. the per-URL default set by [`MockTransport::set_default`]
//! 3. the handler installed with [`MockTransport::with_handler`]
//! 4. a connection-refused error
//!
//! Every attempt is counted per URL and recorded with its decoded request.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    provider::{Transport, TransportError, TransportResponse},
    types::JsonRpcRequest,
};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response { status: u16, body: String },
    Fail(TransportError),
    /// Sleeps for the request timeout, then fails with [`TransportError::Timeout`].
    Timeout,
    /// Never completes.
    Hang,
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    #[must_use]
    pub fn result(result: Value) -> Self {
        Self::Response {
            status: 200,
            body: json!({ "jsonrpc": "2.0", "id": "dontcare", "result": result }).to_string(),
        }
    }

    #[must_use]
    pub fn rpc_error(code: i64, message: &str) -> Self {
        Self::Response {
            status: 200,
            body: json!({
                "jsonrpc": "2.0",
                "id": "dontcare",
                "error": { "code": code, "message": message }
            })
            .to_string(),
        }
    }

    /// NEAR-style handler error with a structured cause.
    #[must_use]
    pub fn rpc_error_with_cause(message: &str, cause: &str) -> Self {
        Self::Response {
            status: 200,
            body: json!({
                "jsonrpc": "2.0",
                "id": "dontcare",
                "error": {
                    "name": "HANDLER_ERROR",
                    "cause": { "name": cause, "info": {} },
                    "code": -32000,
                    "message": "Server error",
                    "data": message
                }
            })
            .to_string(),
        }
    }

    #[must_use]
    pub fn unknown_block(height: u64) -> Self {
        Self::rpc_error_with_cause(
            &format!("DB Not Found Error: BLOCK HEIGHT: {height}"),
            "UNKNOWN_BLOCK",
        )
    }

    #[must_use]
    pub fn http(status: u16, body: &str) -> Self {
        Self::Response { status, body: body.to_string() }
    }

    #[must_use]
    pub fn raw(status: u16, body: &str) -> Self {
        Self::http(status, body)
    }

    #[must_use]
    pub fn connection_refused() -> Self {
        Self::Fail(TransportError::Connect("connection refused or unreachable".to_string()))
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    #[must_use]
    pub fn hang() -> Self {
        Self::Hang
    }

    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

type Handler = Arc<dyn Fn(&str, &JsonRpcRequest) -> MockReply + Send + Sync>;

/// In-memory [`Transport`] with scripted replies and attempt counting.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<HashMap<String, VecDeque<MockReply>>>,
    defaults: Mutex<HashMap<String, MockReply>>,
    handler: Mutex<Option<Handler>>,
    attempts: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<(String, JsonRpcRequest)>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fallback handler consulted when no scripted or default reply exists.
    #[must_use]
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &JsonRpcRequest) -> MockReply + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
        self
    }

    /// Queues a one-shot reply for `url`.
    pub fn push(&self, url: &str, reply: MockReply) {
        self.scripted.lock().entry(url.to_string()).or_default().push_back(reply);
    }

    /// Sets the reply used for `url` whenever its queue is empty.
    pub fn set_default(&self, url: &str, reply: MockReply) {
        self.defaults.lock().insert(url.to_string(), reply);
    }

    #[must_use]
    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().get(url).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().values().sum()
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, JsonRpcRequest)> {
        self.requests.lock().clone()
    }

    /// Number of requests for `method` across all URLs.
    #[must_use]
    pub fn method_count(&self, method: &str) -> usize {
        self.requests.lock().iter().filter(|(_, r)| r.method == method).count()
    }

    fn next_reply(&self, url: &str, request: Option<&JsonRpcRequest>) -> MockReply {
        if let Some(reply) = self.scripted.lock().get_mut(url).and_then(VecDeque::pop_front) {
            return reply;
        }
        if let Some(reply) = self.defaults.lock().get(url).cloned() {
            return reply;
        }
        let handler = self.handler.lock().clone();
        match (handler, request) {
            (Some(handler), Some(request)) => handler(url, request),
            _ => MockReply::connection_refused(),
        }
    }
}

async fn play(reply: MockReply, timeout: Duration) -> Result<TransportResponse, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            MockReply::Response { status, body } => {
                return Ok(TransportResponse { status, body: Bytes::from(body) })
            }
            MockReply::Fail(error) => return Err(error),
            MockReply::Timeout => {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout);
            }
            MockReply::Hang => std::future::pending::<()>().await,
            MockReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        url: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        *self.attempts.lock().entry(url.to_string()).or_default() += 1;
        let request = serde_json::from_slice::<JsonRpcRequest>(&payload).ok();
        if let Some(request) = &request {
            self.requests.lock().push((url.to_string(), request.clone()));
        }

        let reply = self.next_reply(url, request.as_ref());
        play(reply, timeout).await
    }
}

/// Deterministic NEAR-like chain served through a [`MockTransport`] handler.
///
/// Block `h` has hash `block-h` and one chunk `chunk-h-0` holding `txs_per_chunk`
/// transactions `tx-h-i`. Heights above the tip or marked skipped answer `UNKNOWN_BLOCK`;
/// heights marked failing answer connection refused.
#[derive(Debug)]
pub struct MockChain {
    latest: AtomicU64,
    txs_per_chunk: usize,
    skipped: Mutex<HashSet<u64>>,
    failing: Mutex<HashSet<u64>>,
}

impl MockChain {
    #[must_use]
    pub fn new(latest: u64, txs_per_chunk: usize) -> Arc<Self> {
        Arc::new(Self {
            latest: AtomicU64::new(latest),
            txs_per_chunk,
            skipped: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn set_latest(&self, latest: u64) {
        self.latest.store(latest, Ordering::SeqCst);
    }

    #[must_use]
    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn skip(&self, height: u64) {
        self.skipped.lock().insert(height);
    }

    pub fn fail(&self, height: u64) {
        self.failing.lock().insert(height);
    }

    pub fn heal(&self, height: u64) {
        self.failing.lock().remove(&height);
    }

    /// Transport answering every URL from this chain.
    #[must_use]
    pub fn transport(self: &Arc<Self>) -> MockTransport {
        let chain = Arc::clone(self);
        MockTransport::new().with_handler(move |_, request| chain.answer(request))
    }

    #[must_use]
    pub fn answer(&self, request: &JsonRpcRequest) -> MockReply {
        match request.method.as_str() {
            "status" => MockReply::result(status_json(self.latest())),
            "block" => {
                let height = match request.params.get("block_id") {
                    Some(Value::Number(n)) => n.as_u64(),
                    Some(Value::String(hash)) => {
                        hash.strip_prefix("block-").and_then(|h| h.parse().ok())
                    }
                    _ => Some(self.latest()),
                };
                match height {
                    Some(h) if self.failing.lock().contains(&h) => MockReply::connection_refused(),
                    Some(h) if h <= self.latest() && !self.skipped.lock().contains(&h) => {
                        MockReply::result(block_json(h, 1))
                    }
                    Some(h) => MockReply::unknown_block(h),
                    None => MockReply::rpc_error(-32602, "invalid block_id"),
                }
            }
            "chunk" => {
                let chunk_id =
                    request.params.get("chunk_id").and_then(Value::as_str).unwrap_or_default();
                match chunk_id.strip_prefix("chunk-").and_then(|rest| rest.split('-').next()) {
                    Some(h) => match h.parse::<u64>() {
                        Ok(height) => MockReply::result(chunk_json(height, 0, self.txs_per_chunk)),
                        Err(_) => MockReply::rpc_error(-32602, "invalid chunk_id"),
                    },
                    None => MockReply::rpc_error(-32602, "invalid chunk_id"),
                }
            }
            other => MockReply::rpc_error(-32601, &format!("Method not found: {other}")),
        }
    }
}

/// `status` result with the given tip.
#[must_use]
pub fn status_json(latest: u64) -> Value {
    json!({
        "chain_id": "testnet",
        "protocol_version": 73,
        "version": { "version": "2.3.0", "build": "mock" },
        "sync_info": {
            "latest_block_height": latest,
            "latest_block_hash": format!("block-{latest}"),
            "latest_block_time": "2024-05-01T12:00:00.000000000Z",
            "syncing": false
        }
    })
}

/// `block` result with `chunks` chunks, all included at `height`.
#[must_use]
pub fn block_json(height: u64, chunks: u64) -> Value {
    let chunks: Vec<Value> = (0..chunks)
        .map(|shard| {
            json!({
                "chunk_hash": format!("chunk-{height}-{shard}"),
                "shard_id": shard,
                "height_created": height,
                "height_included": height
            })
        })
        .collect();
    json!({
        "author": "validator.testnet",
        "header": {
            "height": height,
            "hash": format!("block-{height}"),
            "prev_hash": format!("block-{}", height.saturating_sub(1)),
            "timestamp": 1_714_564_800_000_000_000u64 + height * 1_000_000_000,
            "timestamp_nanosec": (1_714_564_800_000_000_000u64 + height * 1_000_000_000).to_string()
        },
        "chunks": chunks
    })
}

/// `chunk` result with `txs` transactions.
#[must_use]
pub fn chunk_json(height: u64, shard: u64, txs: usize) -> Value {
    let transactions: Vec<Value> = (0..txs)
        .map(|i| {
            json!({
                "hash": format!("tx-{height}-{i}"),
                "signer_id": "alice.testnet",
                "receiver_id": "bob.testnet",
                "nonce": height * 100 + i as u64,
                "public_key": "ed25519:mock",
                "signature": "ed25519:mock",
                "actions": [{ "Transfer": { "deposit": "1000000000000000000000000" } }]
            })
        })
        .collect();
    json!({
        "author": "validator.testnet",
        "header": {
            "chunk_hash": format!("chunk-{height}-{shard}"),
            "shard_id": shard,
            "height_created": height,
            "height_included": height
        },
        "transactions": transactions,
        "receipts": []
    })
}
