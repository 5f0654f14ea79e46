//! # Local Echo Tracking
//!
//! Messages are shown immediately on send, before server acknowledgment,
//! under a client-generated temporary id. This module owns the temporary
//! id allocator and the echo-key bookkeeping that pairs a later
//! acknowledgment with its echo; the actual rename is the cache's
//! [`super::MessageStore::reify`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{MessageId, StreamId, UserId};

use super::{RawMessage, RawRecipientUser};

/// What the composer hands the engine to create a local echo.
#[derive(Debug, Clone)]
pub enum LocalMessageDraft {
    /// Channel message draft.
    Stream {
        /// Target channel id.
        stream_id: StreamId,
        /// Target channel name.
        stream_name: String,
        /// Target topic.
        topic: String,
        /// Rendered content.
        content: String,
    },
    /// Direct message draft.
    Direct {
        /// All participants, including the sender.
        recipients: Vec<RawRecipientUser>,
        /// Rendered content.
        content: String,
    },
}

#[derive(Debug, Clone, Copy)]
struct PendingEcho {
    local_id: MessageId,
    sender_id: UserId,
}

/// Allocator and registry for in-flight local echoes.
pub struct EchoTracker {
    next_offset: AtomicU64,
    pending: RwLock<HashMap<Uuid, PendingEcho>>,
}

impl EchoTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            next_offset: AtomicU64::new(0),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a temporary id and echo key for a new local message.
    pub fn allocate(&self, sender_id: UserId) -> (MessageId, Uuid) {
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed);
        let local_id = MessageId(MessageId::LOCAL_BASE + offset);
        let echo_key = Uuid::new_v4();
        self.pending
            .write()
            .insert(echo_key, PendingEcho { local_id, sender_id });
        (local_id, echo_key)
    }

    /// Build the synthesized payload for a draft, registering the echo.
    pub fn build_raw(&self, sender_id: UserId, draft: LocalMessageDraft) -> RawMessage {
        let (local_id, echo_key) = self.allocate(sender_id);
        let value = match draft {
            LocalMessageDraft::Stream { stream_id, stream_name, topic, content } => {
                serde_json::json!({
                    "id": local_id.0,
                    "sender_id": sender_id.0,
                    "content": content,
                    "timestamp": crate::time::now_timestamp(),
                    "type": "stream",
                    "stream_id": stream_id.0,
                    "display_recipient": stream_name,
                    "topic": topic,
                    "flags": ["read"],
                })
            }
            LocalMessageDraft::Direct { recipients, content } => {
                serde_json::json!({
                    "id": local_id.0,
                    "sender_id": sender_id.0,
                    "content": content,
                    "timestamp": crate::time::now_timestamp(),
                    "type": "private",
                    "display_recipient": recipients
                        .iter()
                        .map(|r| serde_json::json!({
                            "id": r.id.0,
                            "email": r.email,
                            "full_name": r.full_name,
                        }))
                        .collect::<Vec<_>>(),
                    "flags": ["read"],
                })
            }
        };
        let mut raw: RawMessage =
            serde_json::from_value(value).expect("locally synthesized payload is well-formed");
        raw.local_echo_key = Some(echo_key);
        raw
    }

    /// Resolve an acknowledgment into the echo's temporary id.
    ///
    /// Verifies the confirming payload's sender against the echo; a
    /// mismatch is an integrity violation and the echo stays pending.
    pub fn confirm(&self, echo_key: Uuid, sender_id: UserId) -> Result<MessageId> {
        let mut pending = self.pending.write();
        let echo = pending
            .get(&echo_key)
            .copied()
            .ok_or_else(|| Error::Internal(format!("unknown echo key {echo_key}")))?;
        if echo.sender_id != sender_id {
            return Err(Error::EchoSenderMismatch {
                expected: echo.sender_id.0,
                actual: sender_id.0,
            });
        }
        pending.remove(&echo_key);
        Ok(echo.local_id)
    }

    /// Forget an echo (send failed and the record was evicted).
    pub fn forget(&self, echo_key: Uuid) {
        self.pending.write().remove(&echo_key);
    }

    /// Number of unacknowledged echoes.
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    /// Drop all pending state (test/reset hook).
    pub fn clear(&self) {
        self.pending.write().clear();
    }
}

impl Default for EchoTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
