//! # Error Handling
//!
//! Error types for Perch Core.
//!
//! Two kinds of failure move through the engine and they are handled very
//! differently:
//!
//! - **Integrity violations** (a reaction for a message we never cached, a
//!   duplicate submessage id, a local-echo confirmation from the wrong
//!   sender) are logged with context at the ingestion boundary and the
//!   offending event is dropped. They only surface as [`Error`] values on
//!   single-event APIs, never while draining an event batch.
//! - **Remote failures** during flag synchronization split into transient
//!   (rate limits, retried with server-specified backoff) and terminal
//!   (reported once, operation abandoned).

use thiserror::Error;

/// Result type alias for Perch Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Perch Core
///
/// All errors are categorized by module/domain to make error handling
/// clearer and to provide meaningful error messages to users.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Message Cache Errors (100-199)
    // ========================================================================

    /// Message not found in the cache
    #[error("Message {0} not found in the cache.")]
    MessageNotFound(u64),

    /// A payload failed schema validation at the ingestion boundary
    #[error("Malformed event payload: {0}")]
    MalformedEvent(String),

    /// A local echo was confirmed by a payload with a different sender
    #[error("Local echo hijack: echo sender {expected} but confirmation came from {actual}")]
    EchoSenderMismatch {
        /// Sender id recorded on the local echo
        expected: u64,
        /// Sender id carried by the confirming payload
        actual: u64,
    },

    /// A submessage with this id is already attached to the message
    #[error("Duplicate submessage id {0}")]
    DuplicateSubmessage(u64),

    // ========================================================================
    // Reaction Errors (200-299)
    // ========================================================================

    /// Reaction event referenced a message that is not cached
    #[error("Reaction event for uncached message {0}")]
    ReactionTargetMissing(u64),

    // ========================================================================
    // Notification Errors (300-399)
    // ========================================================================

    /// The platform notification facility is unavailable
    #[error("Desktop notifications are unavailable on this platform.")]
    NotificationsUnavailable,

    // ========================================================================
    // Flag Sync Errors (400-499)
    // ========================================================================

    /// A bulk flag operation is already running over this narrow
    #[error("A flag sync operation is already in flight for this narrow.")]
    FlagSyncInFlight,

    /// The server rejected a flag mutation with a terminal error
    #[error("Flag update failed: {0}")]
    FlagUpdateFailed(String),

    /// Rate limited by the server; retry after the given interval
    #[error("Rate limited; retry after {retry_after}s")]
    RateLimited {
        /// Server-specified backoff in seconds
        retry_after: f64,
    },

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================

    /// The request was cancelled client-side (navigation, shutdown)
    #[error("Request aborted by the client.")]
    RequestAborted,

    /// Network-level transport failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The response body did not match the expected shape
    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Message cache
    /// - 200-299: Reactions
    /// - 300-399: Notifications
    /// - 400-499: Flag sync
    /// - 500-599: Transport
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Message cache (100-199)
            Error::MessageNotFound(_) => 100,
            Error::MalformedEvent(_) => 101,
            Error::EchoSenderMismatch { .. } => 102,
            Error::DuplicateSubmessage(_) => 103,

            // Reactions (200-299)
            Error::ReactionTargetMissing(_) => 200,

            // Notifications (300-399)
            Error::NotificationsUnavailable => 300,

            // Flag sync (400-499)
            Error::FlagSyncInFlight => 400,
            Error::FlagUpdateFailed(_) => 401,
            Error::RateLimited { .. } => 402,

            // Transport (500-599)
            Error::RequestAborted => 500,
            Error::TransportError(_) => 501,
            Error::UnexpectedResponse(_) => 502,

            // Internal (900-999)
            Error::Internal(_) => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can potentially be resolved by retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::TransportError(_)
        )
    }

    /// Check if this error is an integrity violation
    ///
    /// Integrity violations are logged and dropped during batch event
    /// processing rather than aborting the batch.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Error::MalformedEvent(_)
                | Error::EchoSenderMismatch { .. }
                | Error::DuplicateSubmessage(_)
                | Error::ReactionTargetMissing(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedEvent(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
