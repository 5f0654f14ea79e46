//! # Notification Deduplicator
//!
//! Turns "this message/reaction is notifiable" decisions into at most one
//! live platform notification per conversation.
//!
//! ## Protocol
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    NOTIFICATION LIFECYCLE                           │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  notifiable event ──► key lookup ──► live record?                   │
//! │                                        │                            │
//! │               no ◄─────────────────────┴────────────► yes           │
//! │                │                                        │           │
//! │                ▼                                        ▼           │
//! │        open notification                     close old handle,      │
//! │        (count = 1)                           merge counters/sets,   │
//! │                │                             recompute title,       │
//! │                │                             open new notification  │
//! │                ▼                                        │           │
//! │        record stored by key ◄───────────────────────────┘           │
//! │                                                                     │
//! │  click  ──► navigate + close + drop record                          │
//! │  closed ──► drop record (next event starts fresh)                   │
//! │  focus  ──► close every handle, clear both maps                     │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Notifications are a proxy for "you have unseen activity while
//! unfocused", not a persistent log.

pub mod platform;
pub mod policy;

pub use platform::{HandleId, NotificationBackend, NullBackend};
pub use policy::{message_notifiable, reaction_notifiable, NotifyDecision};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::message::{Message, Recipient};
use crate::reactions::{RawReaction, ReactionStore};
use crate::types::{MessageId, StreamId, UserId};

/// Longest body text passed to the platform.
const BODY_LIMIT: usize = 150;

/// Conversation signature for message-level notices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageNoticeKey {
    /// Direct-message conversation, keyed by its display recipient list.
    Direct {
        /// The conversation's `display_reply_to`.
        display_reply_to: String,
    },
    /// Channel conversation, keyed by sender within a topic.
    Stream {
        /// Sender display name.
        sender: String,
        /// Channel display name.
        stream: String,
        /// Topic.
        topic: String,
    },
}

/// Where a notification click should take the user.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationTarget {
    /// A direct-message conversation.
    Direct {
        /// All participant ids.
        to_user_ids: Vec<UserId>,
    },
    /// A channel topic.
    Topic {
        /// Channel id.
        stream_id: StreamId,
        /// Topic.
        topic: String,
    },
    /// A single message.
    Message {
        /// The message id.
        message_id: MessageId,
    },
}

/// Navigation callback injected by the shell.
pub type NavigateFn = Box<dyn Fn(&NavigationTarget) + Send + Sync>;

struct NoticeRecord {
    handle: HandleId,
    message_count: usize,
    title: String,
    // Reaction notices only: display order, newest first.
    voters: Vec<UserId>,
    emoji_names: Vec<String>,
    target: NavigationTarget,
}

/// One keyed map of live notices. The hub owns two: message-level and
/// reaction-level notices share the protocol but never the keyspace.
struct NoticeMap<K> {
    live: RwLock<HashMap<K, NoticeRecord>>,
}

impl<K: Eq + Hash + Clone> NoticeMap<K> {
    fn new() -> Self {
        Self { live: RwLock::new(HashMap::new()) }
    }

    fn insert(&self, key: K, record: NoticeRecord) {
        self.live.write().insert(key, record);
    }

    fn remove(&self, key: &K) -> Option<NoticeRecord> {
        self.live.write().remove(key)
    }

    fn drain(&self) -> Vec<NoticeRecord> {
        self.live.write().drain().map(|(_, r)| r).collect()
    }

    fn len(&self) -> usize {
        self.live.read().len()
    }
}

/// The notification deduplicator.
pub struct NotificationHub {
    backend: Arc<dyn NotificationBackend>,
    reactions: Arc<ReactionStore>,
    navigate: RwLock<Option<NavigateFn>>,
    message_notices: NoticeMap<MessageNoticeKey>,
    reaction_notices: NoticeMap<MessageId>,
}

impl NotificationHub {
    /// Create a hub over the given platform backend.
    pub fn new(backend: Arc<dyn NotificationBackend>, reactions: Arc<ReactionStore>) -> Self {
        Self {
            backend,
            reactions,
            navigate: RwLock::new(None),
            message_notices: NoticeMap::new(),
            reaction_notices: NoticeMap::new(),
        }
    }

    /// Install the click-navigation callback.
    pub fn set_navigate(&self, navigate: NavigateFn) {
        *self.navigate.write() = Some(navigate);
    }

    // ── Message notices ─────────────────────────────────────────────────

    /// Surface a notifiable message, merging into any live notice for the
    /// same conversation. Returns true if a platform notification is now
    /// live for it.
    pub fn notify_message(&self, message: &Message) -> bool {
        let key = Self::message_key(message);
        let target = Self::message_target(message);

        let message_count = match self.message_notices.remove(&key) {
            Some(old) => {
                self.backend.close(old.handle);
                old.message_count + 1
            }
            None => 1,
        };

        let base = match &message.recipient {
            Recipient::Direct { .. } => message.sender_full_name.clone(),
            Recipient::Stream { display_recipient, topic, .. } => format!(
                "{} ({} > {})",
                message.sender_full_name, display_recipient, topic
            ),
        };
        let title = if message_count > 1 {
            format!("{} (and {} more)", base, message_count - 1)
        } else {
            base
        };
        let body = truncate(&message.content, BODY_LIMIT);

        let Some(handle) = self.backend.show(
            &title,
            &body,
            message.small_avatar_url.as_deref(),
            &Self::message_tag(&key),
        ) else {
            // No facility or no permission: skip silently.
            return false;
        };

        self.message_notices.insert(
            key,
            NoticeRecord {
                handle,
                message_count,
                title,
                voters: Vec::new(),
                emoji_names: Vec::new(),
                target,
            },
        );
        true
    }

    /// Click on a message notice: navigate and retire the notification.
    pub fn click_message_notice(&self, key: &MessageNoticeKey) {
        if let Some(record) = self.message_notices.remove(key) {
            self.run_navigate(&record.target);
            self.backend.close(record.handle);
        }
    }

    /// The platform reported a message notice closed (user or system).
    pub fn message_notice_closed(&self, key: &MessageNoticeKey) {
        self.message_notices.remove(key);
    }

    // ── Reaction notices ────────────────────────────────────────────────

    /// Surface a notifiable reaction, merging into any live notice for
    /// the same target message. The just-arrived voter and emoji move to
    /// the front of display order.
    pub fn notify_reaction(&self, message: &Message, reaction: &RawReaction) -> bool {
        let key = message.id;

        let (mut voters, mut emoji_names, message_count) = match self.reaction_notices.remove(&key) {
            Some(old) => {
                self.backend.close(old.handle);
                (old.voters, old.emoji_names, old.message_count + 1)
            }
            None => (Vec::new(), Vec::new(), 1),
        };
        voters.retain(|u| *u != reaction.user_id);
        voters.insert(0, reaction.user_id);
        emoji_names.retain(|n| n != &reaction.emoji_name);
        emoji_names.insert(0, reaction.emoji_name.clone());

        let title = format!(
            "{} reacted with {}",
            self.reactions.label_for_voters(&voters),
            emoji_names.join(",")
        );
        let body = truncate(&message.content, BODY_LIMIT);

        let Some(handle) =
            self.backend
                .show(&title, &body, None, &format!("reaction-{}", key.0))
        else {
            return false;
        };

        self.reaction_notices.insert(
            key,
            NoticeRecord {
                handle,
                message_count,
                title,
                voters,
                emoji_names,
                target: NavigationTarget::Message { message_id: key },
            },
        );
        true
    }

    /// Click on a reaction notice.
    pub fn click_reaction_notice(&self, message_id: MessageId) {
        if let Some(record) = self.reaction_notices.remove(&message_id) {
            self.run_navigate(&record.target);
            self.backend.close(record.handle);
        }
    }

    /// The platform reported a reaction notice closed.
    pub fn reaction_notice_closed(&self, message_id: MessageId) {
        self.reaction_notices.remove(&message_id);
    }

    /// Reaction state moved to a new message id (reification).
    pub fn rename_reaction_notice(&self, old: MessageId, new: MessageId) {
        if let Some(mut record) = self.reaction_notices.remove(&old) {
            record.target = NavigationTarget::Message { message_id: new };
            self.reaction_notices.insert(new, record);
        }
    }

    // ── Bulk teardown ───────────────────────────────────────────────────

    /// Focus returned to the application: close every live notification
    /// and clear both maps.
    pub fn clear_all(&self) {
        for record in self.message_notices.drain() {
            self.backend.close(record.handle);
        }
        for record in self.reaction_notices.drain() {
            self.backend.close(record.handle);
        }
        tracing::debug!("Cleared all live notifications on focus");
    }

    /// Live message-notice count (render/debug surface).
    pub fn live_message_notices(&self) -> usize {
        self.message_notices.len()
    }

    /// Live reaction-notice count.
    pub fn live_reaction_notices(&self) -> usize {
        self.reaction_notices.len()
    }

    /// Current title of a live message notice.
    pub fn message_notice_title(&self, key: &MessageNoticeKey) -> Option<String> {
        self.message_notices.live.read().get(key).map(|r| r.title.clone())
    }

    /// Current title of a live reaction notice.
    pub fn reaction_notice_title(&self, message_id: MessageId) -> Option<String> {
        self.reaction_notices
            .live
            .read()
            .get(&message_id)
            .map(|r| r.title.clone())
    }

    // ── Internal ────────────────────────────────────────────────────────

    /// The conversation signature for a message.
    pub fn message_key(message: &Message) -> MessageNoticeKey {
        match &message.recipient {
            Recipient::Direct { display_reply_to, .. } => MessageNoticeKey::Direct {
                display_reply_to: display_reply_to.clone(),
            },
            Recipient::Stream { display_recipient, topic, .. } => MessageNoticeKey::Stream {
                sender: message.sender_full_name.clone(),
                stream: display_recipient.clone(),
                topic: topic.clone(),
            },
        }
    }

    fn message_target(message: &Message) -> NavigationTarget {
        match &message.recipient {
            Recipient::Direct { to_user_ids, .. } => NavigationTarget::Direct {
                to_user_ids: to_user_ids.clone(),
            },
            Recipient::Stream { stream_id, topic, .. } => NavigationTarget::Topic {
                stream_id: *stream_id,
                topic: topic.clone(),
            },
        }
    }

    fn message_tag(key: &MessageNoticeKey) -> String {
        match key {
            MessageNoticeKey::Direct { display_reply_to } => format!("dm-{display_reply_to}"),
            MessageNoticeKey::Stream { sender, stream, topic } => {
                format!("stream-{sender}-{stream}-{topic}")
            }
        }
    }

    fn run_navigate(&self, target: &NavigationTarget) {
        match &*self.navigate.read() {
            Some(cb) => cb(target),
            None => tracing::debug!("No navigation callback installed"),
        }
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let cut: String = s.chars().take(limit).collect();
        format!("{cut}...")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::platform::mock::MockBackend;
    use super::*;
    use crate::message::{MessageFlags, Provenance};
    use crate::people::{People, Person};
    use crate::prefs::Prefs;
    use crate::reactions::ReactionType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_person(id: u64, name: &str) -> Person {
        Person {
            user_id: UserId(id),
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            avatar_url: None,
            is_bot: false,
            status_emoji: None,
        }
    }

    fn make_hub() -> (Arc<MockBackend>, NotificationHub) {
        let backend = Arc::new(MockBackend::new());
        let people = Arc::new(People::new());
        people.upsert(make_person(1, "Me"));
        people.upsert(make_person(7, "User7"));
        people.upsert(make_person(9, "User9"));
        let reactions = Arc::new(ReactionStore::new(
            UserId(1),
            people,
            Arc::new(Prefs::new()),
        ));
        let hub = NotificationHub::new(backend.clone(), reactions);
        (backend, hub)
    }

    fn stream_message(id: u64, sender: u64, sender_name: &str) -> Message {
        Message {
            id: MessageId(id),
            sender_id: UserId(sender),
            sender_full_name: sender_name.to_string(),
            sender_email: format!("{}@example.com", sender_name.to_lowercase()),
            small_avatar_url: None,
            status_emoji_info: None,
            content: "the message body".into(),
            timestamp: 1700000000,
            recipient: Recipient::Stream {
                stream_id: StreamId(3),
                display_recipient: "general".into(),
                topic: "lunch".into(),
            },
            provenance: Provenance::Server,
            flags: MessageFlags::default(),
            match_content: None,
            match_topic: None,
            raw_reactions: None,
            submessages: Vec::new(),
        }
    }

    fn my_message(id: u64) -> Message {
        stream_message(id, 1, "Me")
    }

    fn reaction(user: u64, name: &str, code: &str) -> RawReaction {
        RawReaction {
            emoji_name: name.to_string(),
            emoji_code: code.to_string(),
            reaction_type: ReactionType::UnicodeEmoji,
            user_id: UserId(user),
        }
    }

    #[test]
    fn test_message_notice_merges_instead_of_stacking() {
        let (backend, hub) = make_hub();
        let msg = stream_message(100, 7, "User7");

        assert!(hub.notify_message(&msg));
        assert_eq!(backend.live_count(), 1);
        assert_eq!(
            backend.last_shown().unwrap().title,
            "User7 (general > lunch)"
        );

        let msg2 = stream_message(101, 7, "User7");
        assert!(hub.notify_message(&msg2));
        // Old handle closed, exactly one live
        assert_eq!(backend.live_count(), 1);
        assert_eq!(
            backend.last_shown().unwrap().title,
            "User7 (general > lunch) (and 1 more)"
        );
        assert_eq!(hub.live_message_notices(), 1);
    }

    #[test]
    fn test_different_conversations_do_not_merge() {
        let (backend, hub) = make_hub();
        hub.notify_message(&stream_message(100, 7, "User7"));

        let mut other_topic = stream_message(101, 7, "User7");
        other_topic.recipient = Recipient::Stream {
            stream_id: StreamId(3),
            display_recipient: "general".into(),
            topic: "dinner".into(),
        };
        hub.notify_message(&other_topic);

        assert_eq!(backend.live_count(), 2);
        assert_eq!(hub.live_message_notices(), 2);
    }

    #[test]
    fn test_reaction_merge_scenario() {
        // Two reactions land on message 42 before any dismissal: one live
        // handle, merged title, newest emoji first.
        let (backend, hub) = make_hub();
        let msg = my_message(42);

        assert!(hub.notify_reaction(&msg, &reaction(7, "👍", "1f44d")));
        assert_eq!(
            hub.reaction_notice_title(MessageId(42)).unwrap(),
            "User7 reacted with 👍"
        );

        assert!(hub.notify_reaction(&msg, &reaction(9, "🎉", "1f389")));
        assert_eq!(backend.live_count(), 1, "never two live notices for one message");
        assert_eq!(
            hub.reaction_notice_title(MessageId(42)).unwrap(),
            "User9 and 1 other reacted with 🎉,👍"
        );
    }

    #[test]
    fn test_reaction_same_voter_again_moves_to_front() {
        let (_, hub) = make_hub();
        let msg = my_message(42);
        hub.notify_reaction(&msg, &reaction(7, "👍", "1f44d"));
        hub.notify_reaction(&msg, &reaction(9, "🎉", "1f389"));
        hub.notify_reaction(&msg, &reaction(7, "🚀", "1f680"));

        assert_eq!(
            hub.reaction_notice_title(MessageId(42)).unwrap(),
            "User7 and 1 other reacted with 🚀,🎉,👍"
        );
    }

    #[test]
    fn test_close_then_new_event_starts_fresh() {
        let (backend, hub) = make_hub();
        let msg = stream_message(100, 7, "User7");
        hub.notify_message(&msg);

        let key = NotificationHub::message_key(&msg);
        hub.message_notice_closed(&key);
        assert_eq!(hub.live_message_notices(), 0);

        hub.notify_message(&stream_message(101, 7, "User7"));
        // Fresh notice, not "and 1 more"
        assert_eq!(
            backend.last_shown().unwrap().title,
            "User7 (general > lunch)"
        );
    }

    #[test]
    fn test_click_navigates_and_retires() {
        let (backend, hub) = make_hub();
        let clicks = Arc::new(AtomicUsize::new(0));
        let clicks2 = clicks.clone();
        hub.set_navigate(Box::new(move |target| {
            assert!(matches!(target, NavigationTarget::Topic { .. }));
            clicks2.fetch_add(1, Ordering::Relaxed);
        }));

        let msg = stream_message(100, 7, "User7");
        hub.notify_message(&msg);
        hub.click_message_notice(&NotificationHub::message_key(&msg));

        assert_eq!(clicks.load(Ordering::Relaxed), 1);
        assert_eq!(backend.live_count(), 0);
        assert_eq!(hub.live_message_notices(), 0);
    }

    #[test]
    fn test_focus_clears_everything() {
        let (backend, hub) = make_hub();
        hub.notify_message(&stream_message(100, 7, "User7"));
        hub.notify_reaction(&my_message(42), &reaction(7, "👍", "1f44d"));
        assert_eq!(backend.live_count(), 2);

        hub.clear_all();
        assert_eq!(backend.live_count(), 0);
        assert_eq!(hub.live_message_notices(), 0);
        assert_eq!(hub.live_reaction_notices(), 0);
    }

    #[test]
    fn test_null_backend_degrades_silently() {
        let people = Arc::new(People::new());
        let reactions = Arc::new(ReactionStore::new(
            UserId(1),
            people,
            Arc::new(Prefs::new()),
        ));
        let hub = NotificationHub::new(Arc::new(NullBackend), reactions);
        assert!(!hub.notify_message(&stream_message(100, 7, "User7")));
        assert_eq!(hub.live_message_notices(), 0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        let long = "x".repeat(200);
        let t = truncate(&long, 150);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), 153);
    }
}
