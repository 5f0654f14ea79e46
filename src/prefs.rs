//! # User Preferences and Mute State
//!
//! The mute/follow state for channels and topics plus the global
//! notification preference matrix. This is the data the eligibility chain
//! in [`crate::notifications::policy`] consults; it owns no decision
//! logic itself.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::StreamId;

/// Per-topic visibility policy, overriding the channel-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPolicy {
    /// Topic is followed: always notifiable, overrides channel mute.
    Followed,
    /// Topic is explicitly unmuted inside a muted channel.
    Unmuted,
    /// Topic is muted.
    Muted,
}

/// Per-channel notification overrides.
///
/// `None` fields fall through to the global switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPrefs {
    /// The channel is muted as a whole.
    pub is_muted: bool,
    /// Channel-level override for desktop notifications.
    pub desktop_notifications: Option<bool>,
    /// Channel-level override for audible notifications.
    pub audible_notifications: Option<bool>,
}

/// Global notification switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    /// Desktop notifications for channel messages.
    pub enable_stream_desktop_notifications: bool,
    /// Audible notifications for channel messages.
    pub enable_stream_audible_notifications: bool,
    /// Desktop notifications for direct messages and mentions.
    pub enable_desktop_notifications: bool,
    /// Audible notifications for direct messages and mentions.
    pub enable_sounds: bool,
    /// Desktop notifications for followed topics.
    pub enable_followed_topic_desktop_notifications: bool,
    /// Audible notifications for followed topics.
    pub enable_followed_topic_audible_notifications: bool,
    /// Render reacting users by name (below the count threshold) instead
    /// of a bare count.
    pub display_reaction_users: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            enable_stream_desktop_notifications: false,
            enable_stream_audible_notifications: false,
            enable_desktop_notifications: true,
            enable_sounds: true,
            enable_followed_topic_desktop_notifications: true,
            enable_followed_topic_audible_notifications: true,
            display_reaction_users: true,
        }
    }
}

/// Owned store for mute/follow state and notification preferences.
pub struct Prefs {
    notification: RwLock<NotificationPrefs>,
    streams: RwLock<HashMap<StreamId, StreamPrefs>>,
    // Topic keys are lowercased: topic matching is case-insensitive.
    topics: RwLock<HashMap<(StreamId, String), TopicPolicy>>,
}

impl Prefs {
    /// Create a store with default global switches and no mutes.
    pub fn new() -> Self {
        Self {
            notification: RwLock::new(NotificationPrefs::default()),
            streams: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
        }
    }

    fn topic_key(stream_id: StreamId, topic: &str) -> (StreamId, String) {
        (stream_id, topic.to_lowercase())
    }

    // ── Global switches ─────────────────────────────────────────────────

    /// Snapshot of the global notification switches.
    pub fn notification_prefs(&self) -> NotificationPrefs {
        self.notification.read().clone()
    }

    /// Replace the global notification switches.
    pub fn set_notification_prefs(&self, prefs: NotificationPrefs) {
        *self.notification.write() = prefs;
    }

    // ── Channel state ───────────────────────────────────────────────────

    /// Per-channel prefs, defaulting to unmuted/no-override.
    pub fn stream_prefs(&self, stream_id: StreamId) -> StreamPrefs {
        self.streams.read().get(&stream_id).copied().unwrap_or_default()
    }

    /// Replace per-channel prefs.
    pub fn set_stream_prefs(&self, stream_id: StreamId, prefs: StreamPrefs) {
        self.streams.write().insert(stream_id, prefs);
    }

    /// Whether a channel is muted as a whole.
    pub fn is_stream_muted(&self, stream_id: StreamId) -> bool {
        self.stream_prefs(stream_id).is_muted
    }

    // ── Topic state ─────────────────────────────────────────────────────

    /// The explicit policy for a topic, if any.
    pub fn topic_policy(&self, stream_id: StreamId, topic: &str) -> Option<TopicPolicy> {
        self.topics
            .read()
            .get(&Self::topic_key(stream_id, topic))
            .copied()
    }

    /// Set or clear the policy for a topic.
    pub fn set_topic_policy(&self, stream_id: StreamId, topic: &str, policy: Option<TopicPolicy>) {
        let key = Self::topic_key(stream_id, topic);
        match policy {
            Some(p) => {
                self.topics.write().insert(key, p);
            }
            None => {
                self.topics.write().remove(&key);
            }
        }
    }

    /// Whether a topic is followed.
    pub fn is_topic_followed(&self, stream_id: StreamId, topic: &str) -> bool {
        self.topic_policy(stream_id, topic) == Some(TopicPolicy::Followed)
    }

    /// Whether a topic is muted (explicit topic mute only).
    pub fn is_topic_muted(&self, stream_id: StreamId, topic: &str) -> bool {
        self.topic_policy(stream_id, topic) == Some(TopicPolicy::Muted)
    }

    /// Whether a topic escapes a channel-level mute (unmuted or followed).
    pub fn is_topic_unmuted_or_followed(&self, stream_id: StreamId, topic: &str) -> bool {
        matches!(
            self.topic_policy(stream_id, topic),
            Some(TopicPolicy::Unmuted) | Some(TopicPolicy::Followed)
        )
    }

    /// Drop all state (test/reset hook).
    pub fn clear(&self) {
        *self.notification.write() = NotificationPrefs::default();
        self.streams.write().clear();
        self.topics.write().clear();
    }
}

impl Default for Prefs {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
