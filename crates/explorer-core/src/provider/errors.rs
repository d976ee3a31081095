use thiserror::Error;

use crate::types::{JsonRpcError, Network};

/// Maximum number of response body bytes kept in an [`TransportError::Http`] error.
pub const MAX_ERROR_BODY_LEN: usize = 256;

/// Failures that prevent a request from producing a usable JSON-RPC response.
///
/// Every variant except [`TransportError::Cancelled`] is retryable: the failover engine
/// retries the same provider with backoff and then moves on to the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Request exceeded the per-attempt timeout.
    #[error("Request timeout")]
    Timeout,

    /// Could not connect to the endpoint (refused, DNS failure, TLS failure).
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Non-2xx HTTP status whose body is not a JSON-RPC error envelope.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Body could not be parsed as a JSON-RPC response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The CORS-bypass proxy could not be reached or rejected the forward.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Returns `true` if the failure should be retried on the same or a different provider.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Builds an [`TransportError::Http`] keeping at most [`MAX_ERROR_BODY_LEN`] bytes of body.
    #[must_use]
    pub fn http(status: u16, body: &str) -> Self {
        let body = if body.len() > MAX_ERROR_BODY_LEN {
            let mut cut = MAX_ERROR_BODY_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}... (truncated)", &body[..cut])
        } else {
            body.to_string()
        };
        Self::Http { status, body }
    }
}

/// Errors surfaced by a logical RPC call through the failover engine.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RpcError {
    /// A transport failure that was not absorbed by failover.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote node answered with a JSON-RPC error object.
    ///
    /// Propagated verbatim without retry or failover.
    #[error("{0}")]
    Application(JsonRpcError),

    /// No provider is enabled on the selected network.
    #[error(
        "No RPC providers are enabled for {network}. Enable at least one provider in the \
         provider settings."
    )]
    NoProvidersAvailable { network: Network },

    /// Every enabled provider exhausted its retries.
    #[error(
        "All {network} RPC providers failed after {attempts} attempts (tried: {}). \
         Last error: {last_error}. Try enabling more providers or check your network \
         connection.",
        .tried.join(", ")
    )]
    AllProvidersFailed {
        network: Network,
        tried: Vec<String>,
        attempts: u32,
        last_error: TransportError,
    },

    /// The selected network changed while the call was in flight.
    #[error("Selected network changed from {from} to {to} during the request")]
    NetworkChanged { from: Network, to: Network },

    /// Request rejected before any I/O.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A successful result did not have the expected shape.
    #[error("Failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// The caller cancelled the call.
    #[error("Request cancelled")]
    Cancelled,
}

impl RpcError {
    /// The remote error object, if this is an application error.
    #[must_use]
    pub fn application_error(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Application(error) => Some(error),
            _ => None,
        }
    }

    /// Returns `true` if the node reported the requested block as unknown.
    #[must_use]
    pub fn is_unknown_block(&self) -> bool {
        self.application_error().is_some_and(JsonRpcError::is_unknown_block)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Transport(TransportError::Cancelled))
    }

    pub(crate) fn decode(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Decode { what, reason: reason.to_string() }
    }
}

/// Errors from the key-value persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from provider registry mutations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Input rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No provider with the given id exists.
    #[error("Provider '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
