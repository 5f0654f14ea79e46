//! # Message Module
//!
//! The message cache and its identity-lifecycle rules.
//!
//! ## Identity Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     MESSAGE IDENTITY LIFECYCLE                      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  compose ──► local echo            server event ──► server message  │
//! │              (temporary id,                         (permanent id,  │
//! │               echo key)                              flags,         │
//! │                   │                                  reactions)     │
//! │                   │    server ack                        │          │
//! │                   └──────────────► reify(old, new) ◄─────┘          │
//! │                                        │                            │
//! │                                        ▼                            │
//! │                    cache entry renamed in place; aggregator and     │
//! │                    recency indices re-keyed, never duplicated       │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache is the sole owner of message records. Everything else holds
//! derived indices keyed by message id and is invalidated through explicit
//! remove/rename calls.

mod alert_words;
mod echo;
mod recent;
mod store;

pub use alert_words::AlertWords;
pub use echo::{EchoTracker, LocalMessageDraft};
pub use recent::RecentIndices;
pub use store::{MessageRef, MessageStore};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::people::StatusEmojiInfo;
use crate::reactions::RawReaction;
use crate::types::{MessageId, StreamId, UserId};

/// Raw flag name the server uses for "read".
pub const FLAG_READ: &str = "read";
/// Raw flag name for a direct mention.
pub const FLAG_MENTIONED: &str = "mentioned";

static WILDCARD_MENTION_FLAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["stream_wildcard_mentioned", "topic_wildcard_mentioned"]
        .into_iter()
        .collect()
});

/// Boolean message state derived from the server's raw flag list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    /// The current user has not read this message.
    pub unread: bool,
    /// Starred by the current user.
    pub starred: bool,
    /// Any mention of the current user (direct or wildcard).
    pub mentioned: bool,
    /// A direct (non-wildcard) mention of the current user.
    pub mentioned_directly: bool,
    /// Collapsed in the message list.
    pub collapsed: bool,
    /// Contains one of the current user's alert words.
    pub alerted: bool,
    /// A desktop notification has already been produced for this message.
    /// Client-side only; never present on the wire.
    pub notification_sent: bool,
}

impl MessageFlags {
    /// Build the booleans from the server's raw flag list.
    ///
    /// `mentioned` is true if either a direct mention or any wildcard
    /// mention flag is present; `mentioned_directly` only for the former.
    pub fn from_raw(flags: &[String]) -> Self {
        let has = |name: &str| flags.iter().any(|f| f == name);
        let wildcard = flags
            .iter()
            .any(|f| WILDCARD_MENTION_FLAGS.contains(f.as_str()));
        Self {
            unread: !has(FLAG_READ),
            starred: has("starred"),
            mentioned: has(FLAG_MENTIONED) || wildcard,
            mentioned_directly: has(FLAG_MENTIONED),
            collapsed: has("collapsed"),
            alerted: has("has_alert_word"),
            notification_sent: false,
        }
    }
}

/// Where a message is addressed, decided once at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    /// A channel message.
    Stream {
        /// Channel id.
        stream_id: StreamId,
        /// Channel display name.
        display_recipient: String,
        /// Topic within the channel.
        topic: String,
    },
    /// A direct message.
    Direct {
        /// All participant ids, sorted, including the current user.
        to_user_ids: Vec<UserId>,
        /// Comma-joined participant emails (the composer target).
        reply_to: String,
        /// Comma-joined participant names, excluding the current user
        /// unless they are the only participant.
        display_reply_to: String,
    },
}

/// Message provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Composed locally, not yet acknowledged by the server. Carries the
    /// echo-tracking key used to match the server's acknowledgment.
    Local {
        /// Client-generated key correlating the echo with its ack.
        echo_key: Uuid,
    },
    /// Confirmed by the server.
    Server,
}

/// A widget/sub-event attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submessage {
    /// Server-assigned submessage id, unique per message.
    pub id: u64,
    /// Author of the submessage.
    pub sender_id: UserId,
    /// Submessage type discriminator.
    pub msg_type: String,
    /// Opaque payload.
    pub content: String,
}

/// A fully-normalized message record.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Currently-valid id (temporary for local echoes until reified).
    pub id: MessageId,
    /// Sender id.
    pub sender_id: UserId,
    /// Sender display name, resolved from the people directory.
    pub sender_full_name: String,
    /// Sender email, resolved from the people directory.
    pub sender_email: String,
    /// Sender's small avatar URL, if known.
    pub small_avatar_url: Option<String>,
    /// Sender's status emoji, if set.
    pub status_emoji_info: Option<StatusEmojiInfo>,
    /// Rendered message content.
    pub content: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// Conversation this message belongs to.
    pub recipient: Recipient,
    /// Local echo or server-confirmed.
    pub provenance: Provenance,
    /// Derived flag booleans.
    pub flags: MessageFlags,
    /// Search-highlight metadata: highlighted content.
    pub match_content: Option<String>,
    /// Search-highlight metadata: highlighted topic.
    pub match_topic: Option<String>,
    /// Raw per-user reactions, present until the aggregator first touches
    /// this message and drains them into its aggregate map.
    pub raw_reactions: Option<Vec<RawReaction>>,
    /// Attached submessages, in arrival order.
    pub submessages: Vec<Submessage>,
}

impl Message {
    /// Whether this is a channel message.
    pub fn is_stream(&self) -> bool {
        matches!(self.recipient, Recipient::Stream { .. })
    }

    /// Whether this is a direct message.
    pub fn is_direct(&self) -> bool {
        matches!(self.recipient, Recipient::Direct { .. })
    }

    /// Channel id, for channel messages.
    pub fn stream_id(&self) -> Option<StreamId> {
        match &self.recipient {
            Recipient::Stream { stream_id, .. } => Some(*stream_id),
            Recipient::Direct { .. } => None,
        }
    }

    /// Topic, for channel messages.
    pub fn topic(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::Stream { topic, .. } => Some(topic),
            Recipient::Direct { .. } => None,
        }
    }

    /// Whether this record is an unconfirmed local echo.
    pub fn is_local_echo(&self) -> bool {
        matches!(self.provenance, Provenance::Local { .. })
    }
}

// ============================================================================
// WIRE PAYLOADS
// ============================================================================

/// A direct-message participant as carried on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecipientUser {
    /// Participant user id.
    pub id: UserId,
    /// Participant email.
    pub email: String,
    /// Participant full name.
    pub full_name: String,
}

/// The conversation portion of a raw message payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RawRecipient {
    /// Channel message.
    Stream {
        /// Channel id.
        stream_id: StreamId,
        /// Channel display name.
        display_recipient: String,
        /// Topic. Older servers send this as `subject`.
        #[serde(alias = "subject")]
        topic: String,
    },
    /// Direct message.
    Private {
        /// All participants, including the sender.
        display_recipient: Vec<RawRecipientUser>,
    },
}

/// A message payload as delivered by the server (or synthesized for a
/// local echo, in which case `local_echo_key` is set).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMessage {
    /// Message id.
    pub id: MessageId,
    /// Sender id.
    pub sender_id: UserId,
    /// Rendered content.
    pub content: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// Conversation fields.
    #[serde(flatten)]
    pub recipient: RawRecipient,
    /// Raw flag names for the current user.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Raw per-user reaction records.
    #[serde(default)]
    pub reactions: Vec<RawReaction>,
    /// Search-highlight metadata.
    #[serde(default)]
    pub match_content: Option<String>,
    /// Search-highlight metadata. Older servers send `match_subject`.
    #[serde(default, alias = "match_subject")]
    pub match_topic: Option<String>,
    /// Present only on locally-synthesized echo payloads.
    #[serde(default, skip_deserializing)]
    pub local_echo_key: Option<Uuid>,
}

// ============================================================================
// TESTS
// ============================================================================
