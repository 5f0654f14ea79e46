//! # Event Ingestion
//!
//! Typed schema for the asynchronous event stream. Payloads are
//! validated here, at the boundary; a malformed payload becomes an
//! integrity violation (logged, dropped) instead of an undefined field
//! propagating through the engine.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::RawMessage;
use crate::people::StatusEmojiInfo;
use crate::reactions::ReactionType;
use crate::types::{MessageId, StreamId, UserId};

/// Direction of a reaction or flag event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOp {
    /// Something was added.
    Add,
    /// Something was removed.
    Remove,
}

/// A validated event from the server stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new message arrived.
    Message {
        /// The message payload.
        message: RawMessage,
    },

    /// A reaction was added or removed.
    Reaction {
        /// Add or remove.
        op: EventOp,
        /// Target message.
        message_id: MessageId,
        /// Reacting user.
        user_id: UserId,
        /// Emoji shortname.
        emoji_name: String,
        /// Codepoint or custom-emoji identifier.
        emoji_code: String,
        /// Emoji kind.
        reaction_type: ReactionType,
    },

    /// Message flags changed for the current user.
    UpdateMessageFlags {
        /// Add or remove.
        op: EventOp,
        /// Flag name, e.g. `"read"`.
        flag: String,
        /// Affected message ids.
        messages: Vec<MessageId>,
    },

    /// A user's display fields changed.
    UserUpdate {
        /// The user.
        user_id: UserId,
        /// New full name, if it changed.
        #[serde(default)]
        full_name: Option<String>,
        /// New avatar URL, if it changed.
        #[serde(default)]
        avatar_url: Option<String>,
        /// New status emoji, if it changed. An explicit `null` clears it,
        /// which this schema folds into `None`.
        #[serde(default)]
        status_emoji: Option<StatusEmojiInfo>,
    },

    /// A channel was renamed.
    StreamUpdate {
        /// The channel.
        stream_id: StreamId,
        /// Its new name.
        name: String,
    },

    /// A local echo was acknowledged: the temporary id gives way to the
    /// permanent one.
    MessageAck {
        /// The echo key from the original send.
        echo_key: uuid::Uuid,
        /// The server-assigned id.
        message_id: MessageId,
        /// Sender as confirmed by the server; must match the echo.
        sender_id: UserId,
    },

    /// A submessage was attached to a message.
    Submessage {
        /// Target message.
        message_id: MessageId,
        /// Submessage id, unique per message.
        submessage_id: u64,
        /// Author.
        sender_id: UserId,
        /// Type discriminator.
        msg_type: String,
        /// Opaque payload.
        content: String,
    },
}

impl Event {
    /// Validate a raw payload into a typed event.
    pub fn parse(value: Value) -> Result<Event> {
        serde_json::from_value(value).map_err(|e| Error::MalformedEvent(e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
