//! RPC Mock Builder for NEAR-style JSON-RPC Testing
//!
//! Wraps mockito to provide `status` / `block` / `chunk` response helpers.

use explorer_core::test_utils::{block_json, chunk_json, status_json};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

/// Builder for creating mock RPC endpoint responses.
///
/// Uses mockito internally; requests are matched on the serialized `method` and params.
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
    status: Option<Mock>,
}

fn method_matcher(method: &str) -> Matcher {
    Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
}

fn result_body(result: &Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

impl RpcMockBuilder {
    /// Creates a new RPC mock builder with a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new(), status: None }
    }

    /// Returns the URL of the mock server.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Mocks the `status` method. Replaces any earlier status mock.
    pub fn mock_status(&mut self, latest: u64) -> &mut Self {
        if let Some(old) = self.status.take() {
            old.remove();
        }
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher("status"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(result_body(&status_json(latest)))
            .create();

        self.status = Some(mock);
        self
    }

    /// Mocks a `block` request by height, with one chunk per shard.
    pub fn mock_block(&mut self, height: u64, shards: u64) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                method_matcher("block"),
                Matcher::Regex(format!(r#""block_id"\s*:\s*{height}[,}}]"#)),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(result_body(&block_json(height, shards)))
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks a `block` request with `finality: final`.
    pub fn mock_final_block(&mut self, height: u64) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                method_matcher("block"),
                Matcher::Regex(r#""finality"\s*:\s*"final""#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(result_body(&block_json(height, 1)))
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks a `chunk` request for the chunk of `shard` at `height`.
    pub fn mock_chunk(&mut self, height: u64, shard: u64, txs: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                method_matcher("chunk"),
                Matcher::Regex(format!(r#""chunk_id"\s*:\s*"chunk-{height}-{shard}""#)),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(result_body(&chunk_json(height, shard, txs)))
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks heights `from..=to`, each with one chunk of `txs` transactions.
    pub fn mock_chain_segment(&mut self, from: u64, to: u64, txs: usize) -> &mut Self {
        for height in from..=to {
            self.mock_block(height, 1).mock_chunk(height, 0, txs);
        }
        self
    }

    /// Mocks a `block` request answered with a server error.
    pub fn mock_block_failure(&mut self, height: u64, status: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                method_matcher("block"),
                Matcher::Regex(format!(r#""block_id"\s*:\s*{height}[,}}]"#)),
            ]))
            .with_status(status)
            .with_body("upstream unavailable")
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks a `block` request for a height the chain skipped.
    pub fn mock_unknown_block(&mut self, height: u64) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                method_matcher("block"),
                Matcher::Regex(format!(r#""block_id"\s*:\s*{height}[,}}]"#)),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {
                        "name": "HANDLER_ERROR",
                        "cause": { "name": "UNKNOWN_BLOCK", "info": {} },
                        "code": -32000,
                        "message": format!("DB Not Found Error: BLOCK HEIGHT: {height}")
                    }
                })
                .to_string(),
            )
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks a JSON-RPC error response for `method`, sent with HTTP `http_status`.
    ///
    /// The returned mock asserts that it was hit `expected_hits` times.
    pub fn mock_rpc_error(
        &mut self,
        method: &str,
        http_status: usize,
        code: i64,
        message: &str,
        expected_hits: usize,
    ) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(http_status)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": code, "message": message }
                })
                .to_string(),
            )
            .expect(expected_hits)
            .create()
    }

    /// Mocks every request with a bare HTTP error; the returned mock can assert hit counts.
    pub fn mock_http_error(&mut self, status: usize, expected_hits: usize) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(status)
            .with_body("Service Unavailable")
            .expect(expected_hits)
            .create()
    }

    /// Returns a reference to the underlying mockito server for advanced mocking.
    pub fn get_server(&mut self) -> &mut ServerGuard {
        &mut self.server
    }

    /// Verifies all mocks were called.
    #[must_use]
    pub fn verify_all_called(&self) -> bool {
        self.mocks.iter().chain(self.status.iter()).all(Mock::matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rpc_mock_builder_creation() {
        let mock = RpcMockBuilder::new().await;
        assert!(mock.url().starts_with("http://"));
    }

    #[tokio::test]
    async fn test_unused_mocks_are_reported() {
        let mut mock = RpcMockBuilder::new().await;
        mock.mock_block(10, 1);
        assert!(!mock.verify_all_called());
    }
}
