//! # Message Cache
//!
//! The single owner of message records. Lookup, normalization, identity
//! renaming (reification) and the rare field-broadcast patches all live
//! here; every other subsystem holds derived indices keyed by message id
//! and is invalidated explicitly.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::people::{People, StatusEmojiInfo};
use crate::reactions::RawReaction;
use crate::types::{MessageId, StreamId, UserId};

use super::{
    AlertWords, Message, MessageFlags, Provenance, RawMessage, RawRecipient, RecentIndices,
    Recipient, Submessage,
};

/// A shared handle to one cached message.
///
/// Duplicate delivery of the same id returns clones of the same `Arc`, so
/// identity is preserved for every holder.
pub type MessageRef = Arc<RwLock<Message>>;

/// The message cache.
pub struct MessageStore {
    my_user_id: UserId,
    people: Arc<People>,
    alert_words: Arc<AlertWords>,
    recent: Arc<RecentIndices>,
    messages: RwLock<HashMap<MessageId, MessageRef>>,
}

impl MessageStore {
    /// Create an empty cache.
    pub fn new(
        my_user_id: UserId,
        people: Arc<People>,
        alert_words: Arc<AlertWords>,
        recent: Arc<RecentIndices>,
    ) -> Self {
        Self {
            my_user_id,
            people,
            alert_words,
            recent,
            messages: RwLock::new(HashMap::new()),
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Pure lookup, no side effects.
    pub fn get(&self, id: MessageId) -> Option<MessageRef> {
        self.messages.read().get(&id).cloned()
    }

    /// Whether an id is cached.
    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.read().contains_key(&id)
    }

    /// Number of cached messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    // ── Insertion ───────────────────────────────────────────────────────

    /// Insert a normalized record, preserving identity on duplicates.
    ///
    /// If an entry already exists for `message.id`, the existing entry is
    /// returned unchanged except that any match-highlight metadata on the
    /// incoming record is copied over. The server may redeliver a message
    /// the client already has (e.g. via two event channels); the second
    /// copy must never displace the first.
    pub fn upsert(&self, message: Message) -> MessageRef {
        let mut messages = self.messages.write();
        if let Some(existing) = messages.get(&message.id) {
            let mut record = existing.write();
            if message.match_content.is_some() {
                record.match_content = message.match_content;
            }
            if message.match_topic.is_some() {
                record.match_topic = message.match_topic;
            }
            return existing.clone();
        }
        let id = message.id;
        let entry = Arc::new(RwLock::new(message));
        messages.insert(id, entry.clone());
        entry
    }

    /// The single normalization entry point for local-echo and server
    /// payloads.
    pub fn process_new_message(&self, raw: RawMessage) -> MessageRef {
        // Duplicate delivery short-circuit, with match-metadata merge.
        if let Some(existing) = self.get(raw.id) {
            let mut record = existing.write();
            if raw.match_content.is_some() {
                record.match_content = raw.match_content;
            }
            if raw.match_topic.is_some() {
                record.match_topic = raw.match_topic;
            }
            return existing.clone();
        }

        let mut flags = MessageFlags::from_raw(&raw.flags);
        if self.alert_words.matches(&raw.content) {
            flags.alerted = true;
        }

        // Sender display fields come from the people directory, not the
        // payload, so later name changes only have one source of truth.
        let (sender_full_name, sender_email, small_avatar_url, status_emoji_info) =
            match self.people.get(raw.sender_id) {
                Some(p) => (p.full_name, p.email, p.avatar_url, p.status_emoji),
                None => (
                    crate::people::UNKNOWN_USER_NAME.to_string(),
                    String::new(),
                    None,
                    None,
                ),
            };

        let recipient = match &raw.recipient {
            RawRecipient::Stream { stream_id, display_recipient, topic } => Recipient::Stream {
                stream_id: *stream_id,
                display_recipient: display_recipient.clone(),
                topic: topic.clone(),
            },
            RawRecipient::Private { display_recipient } => {
                let mut participants = display_recipient.clone();
                participants.sort_by_key(|p| p.id);
                participants.dedup_by_key(|p| p.id);

                let others: Vec<_> = participants
                    .iter()
                    .filter(|p| p.id != self.my_user_id)
                    .collect();
                // A message to yourself has no "others"; address yourself.
                let shown: Vec<_> = if others.is_empty() {
                    participants.iter().collect()
                } else {
                    others
                };
                Recipient::Direct {
                    to_user_ids: participants.iter().map(|p| p.id).collect(),
                    reply_to: shown
                        .iter()
                        .map(|p| p.email.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    display_reply_to: shown
                        .iter()
                        .map(|p| p.full_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }
            }
        };

        let provenance = match raw.local_echo_key {
            Some(echo_key) => Provenance::Local { echo_key },
            None => Provenance::Server,
        };

        // Local echoes lack a durable id; they are indexed after
        // reification instead.
        if provenance == Provenance::Server {
            self.register_indices(raw.id, raw.sender_id, &recipient);
        }

        let message = Message {
            id: raw.id,
            sender_id: raw.sender_id,
            sender_full_name,
            sender_email,
            small_avatar_url,
            status_emoji_info,
            content: raw.content,
            timestamp: raw.timestamp,
            recipient,
            provenance,
            flags,
            match_content: raw.match_content,
            match_topic: raw.match_topic,
            raw_reactions: Some(raw.reactions),
            submessages: Vec::new(),
        };
        self.upsert(message)
    }

    fn register_indices(&self, id: MessageId, sender_id: UserId, recipient: &Recipient) {
        match recipient {
            Recipient::Stream { stream_id, topic, .. } => {
                self.recent
                    .register_stream_message(*stream_id, topic, sender_id, id);
            }
            Recipient::Direct { to_user_ids, .. } => {
                self.recent
                    .register_direct_message(to_user_ids.clone(), sender_id);
            }
        }
    }

    /// Index a message that became server-confirmed after insertion
    /// (reification of a local echo).
    pub fn register_reified(&self, id: MessageId) {
        let Some(entry) = self.get(id) else { return };
        let (sender_id, recipient) = {
            let record = entry.read();
            (record.sender_id, record.recipient.clone())
        };
        self.register_indices(id, sender_id, &recipient);
    }

    // ── Reification ─────────────────────────────────────────────────────

    /// Rename a cache entry's key in place.
    ///
    /// Returns true if the rename happened. A missing `old` entry is a
    /// silent no-op: the server event can arrive after the local entry
    /// was evicted or never existed on this client. Calling twice is
    /// equivalent to calling once, and no entry is created for `new`
    /// when `old` was never present.
    pub fn reify(&self, old: MessageId, new: MessageId) -> bool {
        let mut messages = self.messages.write();
        let Some(entry) = messages.remove(&old) else {
            tracing::debug!(old = old.0, new = new.0, "Reify for absent id; ignoring");
            return false;
        };
        if messages.contains_key(&new) {
            // The server copy already arrived through another channel;
            // the stale echo loses.
            tracing::debug!(old = old.0, new = new.0, "Reify target already cached; dropping echo");
            return false;
        }
        {
            let mut record = entry.write();
            record.id = new;
            record.provenance = Provenance::Server;
        }
        messages.insert(new, entry);
        true
    }

    // ── Reaction handoff ────────────────────────────────────────────────

    /// Drain the raw reaction list for the aggregator.
    ///
    /// `None` means the message is not cached. A cached message whose raw
    /// list was already drained yields an empty list.
    pub fn take_raw_reactions(&self, id: MessageId) -> Option<Vec<RawReaction>> {
        let entry = self.get(id)?;
        let mut record = entry.write();
        Some(record.raw_reactions.take().unwrap_or_default())
    }

    // ── Submessages ─────────────────────────────────────────────────────

    /// Attach a submessage. Duplicate submessage ids are an integrity
    /// violation.
    pub fn add_submessage(&self, message_id: MessageId, submessage: Submessage) -> Result<()> {
        let entry = self
            .get(message_id)
            .ok_or(Error::MessageNotFound(message_id.0))?;
        let mut record = entry.write();
        if record.submessages.iter().any(|s| s.id == submessage.id) {
            return Err(Error::DuplicateSubmessage(submessage.id));
        }
        record.submessages.push(submessage);
        Ok(())
    }

    // ── Flag updates ────────────────────────────────────────────────────

    /// Apply a server-side flag mutation to cached messages. Unknown ids
    /// are skipped; unknown flags are ignored with a debug log.
    pub fn apply_flag_update(&self, ids: &[MessageId], flag: &str, add: bool) {
        let messages = self.messages.read();
        for id in ids {
            let Some(entry) = messages.get(id) else { continue };
            let mut record = entry.write();
            match flag {
                super::FLAG_READ => record.flags.unread = !add,
                "starred" => record.flags.starred = add,
                "collapsed" => record.flags.collapsed = add,
                other => {
                    tracing::debug!(flag = other, "Ignoring unhandled flag update");
                }
            }
        }
    }

    /// Record that a desktop notification was produced for a message so
    /// later deliveries of the same logical event stay silent.
    pub fn set_notification_sent(&self, id: MessageId) {
        if let Some(entry) = self.get(id) {
            entry.write().flags.notification_sent = true;
        }
    }

    // ── Field broadcasts ────────────────────────────────────────────────
    //
    // Full scans. These events are rare relative to message volume, so
    // O(cache size) is acceptable.

    /// Patch the sender display name on every message from `user_id`.
    pub fn update_sender_full_name(&self, user_id: UserId, full_name: &str) {
        for entry in self.messages.read().values() {
            let mut record = entry.write();
            if record.sender_id == user_id {
                record.sender_full_name = full_name.to_string();
            }
        }
    }

    /// Patch the avatar URL on every message from `user_id`.
    pub fn update_small_avatar_url(&self, user_id: UserId, url: Option<&str>) {
        for entry in self.messages.read().values() {
            let mut record = entry.write();
            if record.sender_id == user_id {
                record.small_avatar_url = url.map(|s| s.to_string());
            }
        }
    }

    /// Patch the status emoji on every message from `user_id`.
    pub fn update_status_emoji_info(&self, user_id: UserId, info: Option<StatusEmojiInfo>) {
        for entry in self.messages.read().values() {
            let mut record = entry.write();
            if record.sender_id == user_id {
                record.status_emoji_info = info.clone();
            }
        }
    }

    /// Patch the channel display name on every message in `stream_id`.
    pub fn update_stream_name(&self, stream_id: StreamId, name: &str) {
        for entry in self.messages.read().values() {
            let mut record = entry.write();
            if let Recipient::Stream { stream_id: sid, display_recipient, .. } =
                &mut record.recipient
            {
                if *sid == stream_id {
                    *display_recipient = name.to_string();
                }
            }
        }
    }

    /// Drop every record (test/reset hook).
    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================
