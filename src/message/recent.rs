//! # Recency Indices
//!
//! Secondary indices over cached messages: who spoke recently in each
//! topic, who participates in each direct-message conversation, and the
//! per-topic message history. These are derived structures keyed by
//! message id; the cache invalidates them through the explicit
//! remove/rename entry points, never by traversal.
//!
//! Only server-confirmed messages are registered. Local echoes lack a
//! durable id, so they are indexed after reification, not before.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use crate::types::{MessageId, StreamId, UserId};

type TopicKey = (StreamId, String);

/// Recency tracking for topics and direct conversations.
pub struct RecentIndices {
    // sender -> newest message id they sent in the topic
    senders_by_topic: RwLock<HashMap<TopicKey, HashMap<UserId, MessageId>>>,
    // sorted participant set -> ids of participants who have actually sent
    dm_senders: RwLock<HashMap<Vec<UserId>, BTreeSet<UserId>>>,
    // ordered per-topic history
    topic_history: RwLock<HashMap<TopicKey, BTreeSet<MessageId>>>,
}

impl RecentIndices {
    /// Create empty indices.
    pub fn new() -> Self {
        Self {
            senders_by_topic: RwLock::new(HashMap::new()),
            dm_senders: RwLock::new(HashMap::new()),
            topic_history: RwLock::new(HashMap::new()),
        }
    }

    fn topic_key(stream_id: StreamId, topic: &str) -> TopicKey {
        (stream_id, topic.to_lowercase())
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Register a channel message.
    pub fn register_stream_message(
        &self,
        stream_id: StreamId,
        topic: &str,
        sender_id: UserId,
        message_id: MessageId,
    ) {
        let key = Self::topic_key(stream_id, topic);
        {
            let mut senders = self.senders_by_topic.write();
            let entry = senders.entry(key.clone()).or_default();
            let latest = entry.entry(sender_id).or_insert(message_id);
            if message_id > *latest {
                *latest = message_id;
            }
        }
        self.topic_history.write().entry(key).or_default().insert(message_id);
    }

    /// Register a direct message for its (sorted) participant set.
    pub fn register_direct_message(&self, mut participants: Vec<UserId>, sender_id: UserId) {
        participants.sort_unstable();
        participants.dedup();
        self.dm_senders
            .write()
            .entry(participants)
            .or_default()
            .insert(sender_id);
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Senders in a topic, most recent first.
    pub fn recent_senders(&self, stream_id: StreamId, topic: &str) -> Vec<UserId> {
        let key = Self::topic_key(stream_id, topic);
        let senders = self.senders_by_topic.read();
        let Some(entry) = senders.get(&key) else {
            return Vec::new();
        };
        let mut pairs: Vec<(UserId, MessageId)> =
            entry.iter().map(|(u, m)| (*u, *m)).collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs.into_iter().map(|(u, _)| u).collect()
    }

    /// Participants who have sent in a direct conversation.
    pub fn direct_senders(&self, mut participants: Vec<UserId>) -> Vec<UserId> {
        participants.sort_unstable();
        participants.dedup();
        self.dm_senders
            .read()
            .get(&participants)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Message ids in a topic, ascending.
    pub fn topic_messages(&self, stream_id: StreamId, topic: &str) -> Vec<MessageId> {
        self.topic_history
            .read()
            .get(&Self::topic_key(stream_id, topic))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    // ── External invalidation ───────────────────────────────────────────

    /// Move all keyed state from `old` to `new`. No-op when `old` is not
    /// indexed (local echoes never are).
    pub fn rename(&self, old: MessageId, new: MessageId) {
        {
            let mut senders = self.senders_by_topic.write();
            for entry in senders.values_mut() {
                for latest in entry.values_mut() {
                    if *latest == old {
                        *latest = new;
                    }
                }
            }
        }
        let mut history = self.topic_history.write();
        for set in history.values_mut() {
            if set.remove(&old) {
                set.insert(new);
            }
        }
    }

    /// Remove one message id from the per-topic history.
    pub fn remove(&self, id: MessageId) {
        let mut history = self.topic_history.write();
        for set in history.values_mut() {
            set.remove(&id);
        }
    }

    /// Drop all state (test/reset hook).
    pub fn clear(&self) {
        self.senders_by_topic.write().clear();
        self.dm_senders.write().clear();
        self.topic_history.write().clear();
    }
}

impl Default for RecentIndices {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
