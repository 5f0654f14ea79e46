//! # Typed Identifiers
//!
//! Newtype wrappers for the ids that cross the wire. Keeping these distinct
//! at the type level prevents the classic bug of indexing a message map
//! with a user id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A server-assigned user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A channel (stream) id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message id.
///
/// Server-confirmed messages carry ids assigned by the server. Local echoes
/// carry temporary ids drawn from a reserved high range (see
/// [`MessageId::LOCAL_BASE`]) so the two spaces can never collide and
/// provenance stays checkable after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// First id of the reserved local-echo range.
    pub const LOCAL_BASE: u64 = 1 << 62;

    /// Whether this id belongs to the reserved local-echo range.
    pub fn is_local(self) -> bool {
        self.0 >= Self::LOCAL_BASE
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
