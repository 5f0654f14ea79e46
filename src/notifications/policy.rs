//! # Notification Eligibility
//!
//! The ordered filter chain deciding whether a message or reaction event
//! qualifies for a desktop/audible alert. Each step is a hard
//! short-circuit; the ordering is normative:
//!
//! 1. sender is self: never
//! 2. notification already sent for this message: never
//! 3. direct mention: always, overriding mute state
//! 4. followed topic: always
//! 5. muted channel without a topic-level unmute/follow: never
//! 6. muted topic: never
//! 7. otherwise the per-channel/global preference matrix, desktop and
//!    audible evaluated independently

use crate::message::{Message, Recipient};
use crate::prefs::Prefs;
use crate::types::UserId;

/// Outcome of the eligibility chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyDecision {
    /// Show a desktop notification.
    pub desktop: bool,
    /// Play the notification sound.
    pub audible: bool,
}

impl NotifyDecision {
    /// Neither channel fires.
    pub const NONE: NotifyDecision = NotifyDecision { desktop: false, audible: false };
    /// Both channels fire.
    pub const ALL: NotifyDecision = NotifyDecision { desktop: true, audible: true };

    /// Whether anything fires at all.
    pub fn any(self) -> bool {
        self.desktop || self.audible
    }
}

/// Evaluate the chain for a newly-arrived message.
pub fn message_notifiable(message: &Message, my_user_id: UserId, prefs: &Prefs) -> NotifyDecision {
    if message.sender_id == my_user_id {
        return NotifyDecision::NONE;
    }
    // Multiple deliveries of the same logical event (edits, flag updates)
    // must not stack alerts.
    if message.flags.notification_sent {
        return NotifyDecision::NONE;
    }
    if message.flags.mentioned_directly {
        return NotifyDecision::ALL;
    }

    let np = prefs.notification_prefs();

    match &message.recipient {
        Recipient::Direct { .. } => NotifyDecision {
            desktop: np.enable_desktop_notifications,
            audible: np.enable_sounds,
        },
        Recipient::Stream { stream_id, topic, .. } => {
            if prefs.is_topic_followed(*stream_id, topic) {
                return NotifyDecision {
                    desktop: np.enable_followed_topic_desktop_notifications,
                    audible: np.enable_followed_topic_audible_notifications,
                };
            }
            if prefs.is_stream_muted(*stream_id)
                && !prefs.is_topic_unmuted_or_followed(*stream_id, topic)
            {
                return NotifyDecision::NONE;
            }
            if prefs.is_topic_muted(*stream_id, topic) {
                return NotifyDecision::NONE;
            }
            // Wildcard mentions and alert words behave like personal
            // pings once the mute checks have passed.
            if message.flags.mentioned || message.flags.alerted {
                return NotifyDecision {
                    desktop: np.enable_desktop_notifications,
                    audible: np.enable_sounds,
                };
            }
            let sp = prefs.stream_prefs(*stream_id);
            NotifyDecision {
                desktop: sp
                    .desktop_notifications
                    .unwrap_or(np.enable_stream_desktop_notifications),
                audible: sp
                    .audible_notifications
                    .unwrap_or(np.enable_stream_audible_notifications),
            }
        }
    }
}

/// Evaluate eligibility for a reaction event.
///
/// Reactions alert only when they land on the current user's own message
/// and come from someone else.
pub fn reaction_notifiable(
    message: &Message,
    reacting_user: UserId,
    my_user_id: UserId,
    prefs: &Prefs,
) -> NotifyDecision {
    if reacting_user == my_user_id {
        return NotifyDecision::NONE;
    }
    if message.sender_id != my_user_id {
        return NotifyDecision::NONE;
    }
    let np = prefs.notification_prefs();
    NotifyDecision {
        desktop: np.enable_desktop_notifications,
        audible: np.enable_sounds,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageFlags, Provenance};
    use crate::prefs::{StreamPrefs, TopicPolicy};
    use crate::types::{MessageId, StreamId};

    fn stream_message(sender: u64, flags: MessageFlags) -> Message {
        Message {
            id: MessageId(100),
            sender_id: UserId(sender),
            sender_full_name: "Alice".into(),
            sender_email: "alice@example.com".into(),
            small_avatar_url: None,
            status_emoji_info: None,
            content: "hello".into(),
            timestamp: 1700000000,
            recipient: Recipient::Stream {
                stream_id: StreamId(3),
                display_recipient: "general".into(),
                topic: "lunch".into(),
            },
            provenance: Provenance::Server,
            flags,
            match_content: None,
            match_topic: None,
            raw_reactions: None,
            submessages: Vec::new(),
        }
    }

    fn dm_message(sender: u64) -> Message {
        let mut m = stream_message(sender, MessageFlags::default());
        m.recipient = Recipient::Direct {
            to_user_ids: vec![UserId(1), UserId(sender)],
            reply_to: "alice@example.com".into(),
            display_reply_to: "Alice".into(),
        };
        m
    }

    const ME: UserId = UserId(1);

    #[test]
    fn test_self_sender_never_notifies() {
        let prefs = Prefs::new();
        let mut flags = MessageFlags::default();
        flags.mentioned_directly = true;
        flags.mentioned = true;
        let msg = stream_message(1, flags);
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::NONE);
    }

    #[test]
    fn test_notification_sent_never_notifies_again() {
        let prefs = Prefs::new();
        let mut flags = MessageFlags::default();
        flags.mentioned_directly = true;
        flags.mentioned = true;
        flags.notification_sent = true;
        let msg = stream_message(7, flags);
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::NONE);
    }

    #[test]
    fn test_direct_mention_overrides_muted_topic() {
        let prefs = Prefs::new();
        prefs.set_topic_policy(StreamId(3), "lunch", Some(TopicPolicy::Muted));

        let mut flags = MessageFlags::default();
        flags.mentioned = true;
        flags.mentioned_directly = true;
        let msg = stream_message(7, flags);
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::ALL);
    }

    #[test]
    fn test_wildcard_mention_does_not_override_muted_topic() {
        let prefs = Prefs::new();
        prefs.set_topic_policy(StreamId(3), "lunch", Some(TopicPolicy::Muted));

        let mut flags = MessageFlags::default();
        flags.mentioned = true; // wildcard only
        let msg = stream_message(7, flags);
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::NONE);
    }

    #[test]
    fn test_followed_topic_notifies_in_muted_stream() {
        let prefs = Prefs::new();
        prefs.set_stream_prefs(
            StreamId(3),
            StreamPrefs { is_muted: true, ..Default::default() },
        );
        prefs.set_topic_policy(StreamId(3), "lunch", Some(TopicPolicy::Followed));

        let msg = stream_message(7, MessageFlags::default());
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::ALL);
    }

    #[test]
    fn test_muted_stream_without_override_is_silent() {
        let prefs = Prefs::new();
        prefs.set_stream_prefs(
            StreamId(3),
            StreamPrefs { is_muted: true, ..Default::default() },
        );
        // Even a wildcard mention stays silent in a muted stream
        let mut flags = MessageFlags::default();
        flags.mentioned = true;
        let msg = stream_message(7, flags);
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::NONE);
    }

    #[test]
    fn test_unmuted_topic_escapes_stream_mute_then_uses_matrix() {
        let prefs = Prefs::new();
        prefs.set_stream_prefs(
            StreamId(3),
            StreamPrefs {
                is_muted: true,
                desktop_notifications: Some(true),
                audible_notifications: Some(false),
            },
        );
        prefs.set_topic_policy(StreamId(3), "lunch", Some(TopicPolicy::Unmuted));

        let msg = stream_message(7, MessageFlags::default());
        let decision = message_notifiable(&msg, ME, &prefs);
        assert!(decision.desktop);
        assert!(!decision.audible);
    }

    #[test]
    fn test_dm_uses_global_switches() {
        let prefs = Prefs::new();
        let msg = dm_message(7);
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::ALL);

        let mut np = prefs.notification_prefs();
        np.enable_sounds = false;
        prefs.set_notification_prefs(np);
        let decision = message_notifiable(&msg, ME, &prefs);
        assert!(decision.desktop);
        assert!(!decision.audible);
    }

    #[test]
    fn test_plain_stream_message_uses_stream_switches() {
        let prefs = Prefs::new();
        let msg = stream_message(7, MessageFlags::default());
        // Global stream switches default off
        assert_eq!(message_notifiable(&msg, ME, &prefs), NotifyDecision::NONE);

        prefs.set_stream_prefs(
            StreamId(3),
            StreamPrefs {
                is_muted: false,
                desktop_notifications: Some(true),
                audible_notifications: None,
            },
        );
        let decision = message_notifiable(&msg, ME, &prefs);
        assert!(decision.desktop);
        assert!(!decision.audible);
    }

    #[test]
    fn test_reaction_eligibility() {
        let prefs = Prefs::new();
        // Reaction on my own message from someone else: notifiable
        let mine = stream_message(1, MessageFlags::default());
        assert!(reaction_notifiable(&mine, UserId(7), ME, &prefs).any());
        // From myself: no
        assert!(!reaction_notifiable(&mine, ME, ME, &prefs).any());
        // On someone else's message: no
        let theirs = stream_message(7, MessageFlags::default());
        assert!(!reaction_notifiable(&theirs, UserId(9), ME, &prefs).any());
    }
}
