use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::{
    provider::errors::TransportError,
    types::{JsonRpcError, JsonRpcResponse},
};

/// Header carrying the real endpoint when requests are forwarded through a proxy.
pub const TARGET_URL_HEADER: &str = "x-target-url";

/// Raw HTTP outcome of one request.
///
/// Non-2xx statuses are returned as responses rather than errors so the caller can tell a
/// JSON-RPC error body apart from a bare HTTP failure.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// A well-formed JSON-RPC reply.
#[derive(Debug, Clone)]
pub enum RpcReply {
    Success(serde_json::Value),
    /// The node answered with an `error` object.
    Error(JsonRpcError),
}

impl TransportResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classifies the response.
    ///
    /// A body carrying a JSON-RPC `error` object is an application reply whatever the HTTP
    /// status. Otherwise a non-2xx status, an unparseable body, or a body with neither
    /// `result` nor `error` is a transport failure.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] or [`TransportError::InvalidResponse`].
    pub fn decode(&self) -> Result<RpcReply, TransportError> {
        let parsed = serde_json::from_slice::<JsonRpcResponse>(&self.body);

        if let Ok(JsonRpcResponse { error: Some(error), .. }) = &parsed {
            return Ok(RpcReply::Error(error.clone()));
        }

        if !self.is_success() {
            return Err(TransportError::http(self.status, &String::from_utf8_lossy(&self.body)));
        }

        match parsed {
            Ok(JsonRpcResponse { result: Some(result), .. }) => Ok(RpcReply::Success(result)),
            Ok(_) => Err(TransportError::InvalidResponse(
                "response has neither result nor error".to_string(),
            )),
            Err(e) => Err(TransportError::InvalidResponse(e.to_string())),
        }
    }
}

/// Sends one serialized JSON-RPC payload to one endpoint.
///
/// Implementations perform exactly one attempt; retry and failover belong to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no HTTP response could be obtained within `timeout`.
    async fn send(
        &self,
        url: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Maximum number of concurrent HTTP requests allowed
    pub concurrent_limit: usize,
    /// How long to wait for a free permit before failing with a timeout
    pub permit_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// CORS-bypass proxy; when set every request is posted here with the real endpoint in
    /// the [`TARGET_URL_HEADER`] header.
    pub proxy_url: Option<Url>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: 64,
            permit_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("chain-explorer/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy_url: None,
        }
    }
}

/// HTTP transport with semaphore-based concurrency control.
pub struct HttpTransport {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpTransportConfig,
}

/// RAII guard ensuring semaphore permits are always released.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl PermitGuard {
    fn new(permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        Self { _permit: permit, semaphore }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .connect_timeout(config.connect_timeout)
            .use_rustls_tls()
            .user_agent(config.user_agent.as_str())
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                TransportError::Connect(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit.max(1))),
            config,
        })
    }

    #[must_use]
    pub fn proxy_url(&self) -> Option<&Url> {
        self.config.proxy_url.as_ref()
    }

    /// Sanitizes network errors to prevent information disclosure.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_redirect() {
            "too many redirects".to_string()
        } else {
            "network error".to_string()
        }
    }

    fn map_send_error(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout;
        }
        let sanitized = Self::sanitize_network_error(error);
        if self.config.proxy_url.is_some() {
            TransportError::Proxy(sanitized)
        } else {
            TransportError::Connect(sanitized)
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let permit = tokio::time::timeout(
            self.config.permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                url = url,
                available_permits = self.concurrent_limit.available_permits(),
                "http transport semaphore acquisition timeout"
            );
            TransportError::Timeout
        })?
        .map_err(|_| TransportError::Connect("transport shut down".to_string()))?;

        let _permit_guard = PermitGuard::new(permit, self.concurrent_limit.clone());

        let request = match &self.config.proxy_url {
            Some(proxy) => {
                self.client.post(proxy.as_str()).header(TARGET_URL_HEADER, url)
            }
            None => self.client.post(url),
        };

        let response = request
            .header("content-type", "application/json")
            .body(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::InvalidResponse(Self::sanitize_network_error(&e))
            }
        })?;

        tracing::trace!(url = url, status = status, bytes = body.len(), "http request completed");

        Ok(TransportResponse { status, body })
    }
}
