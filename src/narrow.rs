//! # Narrows
//!
//! A narrow is an ordered list of `{operator, operand, negated}` triples
//! describing a filtered view over messages. The flag-sync endpoint
//! consumes the same serialized form the message-list endpoints do, so
//! the wire shape here is the one source of truth.

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, StreamId, UserId};

/// An operand is either textual (channel name, topic, flag name) or an id
/// list (dm participant sets), depending on the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// Channel id operand (`channel` operator).
    ChannelId(u64),
    /// Participant id list (`dm` operator).
    UserIds(Vec<UserId>),
    /// Textual operand (`topic`, `is`, `search`, ...).
    Text(String),
}

/// One `{operator, operand, negated}` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowTerm {
    /// Operator name, e.g. `"channel"`, `"topic"`, `"dm"`, `"is"`.
    pub operator: String,
    /// Operator-specific operand.
    pub operand: Operand,
    /// Whether the term is negated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

impl NarrowTerm {
    /// Build a non-negated term.
    pub fn new(operator: &str, operand: Operand) -> Self {
        Self {
            operator: operator.to_string(),
            operand,
            negated: false,
        }
    }
}

/// An ordered sequence of narrow terms.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Narrow {
    /// The terms, in order.
    pub terms: Vec<NarrowTerm>,
}

impl Narrow {
    /// The empty narrow (all messages).
    pub fn all() -> Self {
        Self::default()
    }

    /// Narrow to one channel.
    pub fn channel(stream_id: StreamId) -> Self {
        Self {
            terms: vec![NarrowTerm::new("channel", Operand::ChannelId(stream_id.0))],
        }
    }

    /// Narrow to one topic within a channel.
    pub fn topic(stream_id: StreamId, topic: &str) -> Self {
        Self {
            terms: vec![
                NarrowTerm::new("channel", Operand::ChannelId(stream_id.0)),
                NarrowTerm::new("topic", Operand::Text(topic.to_string())),
            ],
        }
    }

    /// Narrow to a direct-message conversation with the given participants.
    pub fn dm(user_ids: Vec<UserId>) -> Self {
        Self {
            terms: vec![NarrowTerm::new("dm", Operand::UserIds(user_ids))],
        }
    }

    /// Serialize to the wire form the flag endpoint consumes.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("narrow terms are always serializable")
    }

    /// A stable key identifying this narrow for in-flight dedup.
    pub fn dedup_key(&self) -> String {
        self.to_wire().to_string()
    }
}

/// Anchor for a paged flag mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The logical start of the narrow. Bulk reads start here rather than
    /// at the first unread so older muted-unread messages are not
    /// stranded.
    Oldest,
    /// The logical end of the narrow.
    Newest,
    /// A concrete message id.
    Id(MessageId),
}

impl Anchor {
    /// Wire form of the anchor.
    pub fn to_wire(self) -> serde_json::Value {
        match self {
            Anchor::Oldest => serde_json::Value::String("oldest".to_string()),
            Anchor::Newest => serde_json::Value::String("newest".to_string()),
            Anchor::Id(id) => serde_json::Value::from(id.0),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
