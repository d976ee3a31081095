//! Core type definitions shared across the crate.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: wire envelopes sent to and
//!   received from providers
//!
//! ## Chain Addressing
//! - [`Network`]: the provider partition a call is routed through
//! - [`BlockId`], [`BlockRange`]: block heights and hashes used by queries and the sync cursor

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, fmt, str::FromStr};

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the protocol version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Network partition of the provider universe.
///
/// Exactly one network is selected at a time; every provider belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Localnet,
    Custom,
}

impl Network {
    pub const ALL: [Network; 4] =
        [Network::Mainnet, Network::Testnet, Network::Localnet, Network::Custom];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Localnet => "localnet",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown network name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown network '{0}' (expected mainnet, testnet, localnet or custom)")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "localnet" => Ok(Self::Localnet),
            "custom" => Ok(Self::Custom),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// JSON-RPC 2.0 request envelope.
///
/// # Example
///
/// ```
/// use explorer_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("status", json!([]), 7);
/// assert_eq!(request.method, "status");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, id, method: method.into(), params }
    }
}

/// JSON-RPC 2.0 response envelope.
///
/// A response with a top-level `error` is an application error; `result` without `error`
/// is success. Anything else is a malformed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: Cow<'static, str>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

fn default_version() -> Cow<'static, str> {
    JSONRPC_VERSION_COW
}

/// Structured cause attached to an error by NEAR-style nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCause {
    pub name: String,
    #[serde(default)]
    pub info: Option<Value>,
}

/// JSON-RPC 2.0 error object as returned by the remote node.
///
/// Besides the standard `code`/`message`/`data`, NEAR-style nodes attach a `name`
/// (error family) and a structured `cause`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorCause>,
}

impl JsonRpcError {
    /// Name of the structured cause, if the node provided one.
    #[must_use]
    pub fn cause_name(&self) -> Option<&str> {
        self.cause.as_ref().map(|c| c.name.as_str())
    }

    /// Whether the node reported that the requested block does not exist.
    ///
    /// Heights can legitimately be skipped by the chain, so this is not a failure when
    /// scanning a range.
    #[must_use]
    pub fn is_unknown_block(&self) -> bool {
        self.cause_name() == Some("UNKNOWN_BLOCK")
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(Value::String(data)) if !data.is_empty() && data != &self.message => {
                write!(f, "{}: {data}", self.message)
            }
            _ => match self.cause_name() {
                Some(cause) => write!(f, "{} ({cause})", self.message),
                None => f.write_str(&self.message),
            },
        }
    }
}

/// Identifies a block either by height or by hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockId {
    Height(u64),
    Hash(String),
}

impl BlockId {
    /// JSON value used in the `block_id` request field.
    #[must_use]
    pub fn to_param(&self) -> Value {
        match self {
            Self::Height(height) => Value::from(*height),
            Self::Hash(hash) => Value::from(hash.as_str()),
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Height(height) => write!(f, "#{height}"),
            Self::Hash(hash) => f.write_str(hash),
        }
    }
}

impl From<u64> for BlockId {
    fn from(height: u64) -> Self {
        Self::Height(height)
    }
}

impl FromStr for BlockId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('#');
        Ok(match trimmed.parse::<u64>() {
            Ok(height) => Self::Height(height),
            Err(_) => Self::Hash(trimmed.to_string()),
        })
    }
}

/// Inclusive block height range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Creates a new inclusive range.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `from > to`.
    #[inline]
    #[must_use]
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to, "Invalid BlockRange: from ({from}) > to ({to})");
        Self { from, to }
    }

    /// Range covering the half-open interval `(after, up_to]`, or `None` if it is empty.
    #[must_use]
    pub fn after(after: u64, up_to: u64) -> Option<Self> {
        (up_to > after).then(|| Self { from: after + 1, to: up_to })
    }

    /// Number of heights in the range.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from).saturating_add(1)
    }

    /// Only true for ranges built without [`BlockRange::new`]'s check where `from > to`.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, height: u64) -> bool {
        height >= self.from && height <= self.to
    }

    /// Heights in ascending order.
    pub fn heights(&self) -> impl Iterator<Item = u64> {
        self.from..=self.to
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}
