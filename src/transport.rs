//! # Transport Seam
//!
//! The engine never owns an HTTP client. It talks to an injected
//! [`Transport`] implementation and only specifies the contract it needs:
//! asynchronous verb methods returning JSON, with rate limits and
//! client-side aborts distinguishable from real failures.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::MessageId;

/// Error code the server uses for rate-limit responses.
pub const RATE_LIMIT_CODE: &str = "RATE_LIMIT_HIT";

/// Transport-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a structured API error.
    #[error("API error {code}: {msg}")]
    Api {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        msg: String,
        /// Backoff in seconds, present on rate-limit responses.
        retry_after: Option<f64>,
    },

    /// The request was cancelled client-side (navigation, shutdown).
    /// Expected during teardown; never logged as an error.
    #[error("request aborted")]
    Aborted,

    /// The request failed below the API layer.
    #[error("network failure: {0}")]
    Network(String),

    /// Non-API HTTP failure status.
    #[error("HTTP status {0}")]
    Http(u16),
}

impl TransportError {
    /// Whether this is a rate-limit response, and the backoff if so.
    pub fn rate_limit_backoff(&self) -> Option<f64> {
        match self {
            TransportError::Api { code, retry_after, .. } if code == RATE_LIMIT_CODE => {
                // Servers occasionally omit the header; fall back to 1s.
                Some(retry_after.unwrap_or(1.0))
            }
            _ => None,
        }
    }
}

/// Asynchronous request transport.
///
/// Implementations own retry policy for everything except flag mutations;
/// the flag-sync coordinator drives its own rate-limit backoff through
/// the error contract above.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body.
    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError>;

    /// GET with query parameters.
    async fn get(&self, path: &str, params: Value) -> Result<Value, TransportError>;

    /// PATCH a JSON body.
    async fn patch(&self, path: &str, body: Value) -> Result<Value, TransportError>;

    /// DELETE with query parameters.
    async fn delete(&self, path: &str, params: Value) -> Result<Value, TransportError>;
}

/// Response to one page of a bulk flag mutation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateFlagsResponse {
    /// Messages examined by this page.
    #[serde(default)]
    pub processed_count: u64,
    /// Messages whose flag actually changed.
    #[serde(default)]
    pub updated_count: u64,
    /// Whether the page reached the oldest matching message.
    #[serde(default)]
    pub found_oldest: bool,
    /// Whether the page reached the newest matching message. When false,
    /// another page is required, anchored at `last_processed_id`.
    #[serde(default)]
    pub found_newest: bool,
    /// Id of the last message this page processed; the next page anchors
    /// here.
    pub last_processed_id: Option<MessageId>,
}

impl UpdateFlagsResponse {
    /// Parse from a raw response body.
    pub fn from_value(value: &Value) -> Result<Self, TransportError> {
        serde_json::from_value(value.clone()).map_err(|e| {
            TransportError::Network(format!("malformed flag response: {e}"))
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
