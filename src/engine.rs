//! # Client Core
//!
//! The owned store object tying the subsystems together: one
//! constructor-injected instance per client session, with an explicit
//! [`ClientCore::reset`] hook instead of ambient singletons.
//!
//! Event routing lives here. Between awaits everything is synchronous, so
//! cache and aggregate mutations never interleave mid-operation; the only
//! suspension points are the flag-sync requests and their backoff timers.

use serde_json::Value;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::Result;
use crate::event::{Event, EventOp};
use crate::flags::{BulkFlagSummary, FlagOp, FlagSyncCoordinator};
use crate::message::{
    AlertWords, EchoTracker, LocalMessageDraft, MessageRef, MessageStore, RecentIndices,
};
use crate::narrow::Narrow;
use crate::notifications::{
    message_notifiable, reaction_notifiable, NavigateFn, NotificationBackend, NotificationHub,
    NotifyDecision,
};
use crate::people::People;
use crate::prefs::Prefs;
use crate::reactions::{CleanReaction, RawReaction, ReactionKey, ReactionStore};
use crate::transport::Transport;
use crate::types::{MessageId, UserId};

/// The client-resident engine.
///
/// Rendering, hotkeys and the compose box live outside; they read through
/// the getters and drive mutations through the event entry points. The
/// engine never writes to presentation state.
pub struct ClientCore {
    config: CoreConfig,
    people: Arc<People>,
    prefs: Arc<Prefs>,
    alert_words: Arc<AlertWords>,
    recent: Arc<RecentIndices>,
    echoes: EchoTracker,
    messages: MessageStore,
    reactions: Arc<ReactionStore>,
    notifications: NotificationHub,
    flags: FlagSyncCoordinator,
}

impl ClientCore {
    /// Construct an engine over the injected collaborators.
    pub fn new(
        config: CoreConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn NotificationBackend>,
    ) -> Self {
        if config.verbose_logging {
            tracing::debug!(user_id = config.user_id.0, "Constructing client core");
        }
        let people = Arc::new(People::new());
        let prefs = Arc::new(Prefs::new());
        let alert_words = Arc::new(AlertWords::new());
        let recent = Arc::new(RecentIndices::new());
        let messages = MessageStore::new(
            config.user_id,
            people.clone(),
            alert_words.clone(),
            recent.clone(),
        );
        let reactions = Arc::new(ReactionStore::new(
            config.user_id,
            people.clone(),
            prefs.clone(),
        ));
        let notifications = NotificationHub::new(backend, reactions.clone());
        let flags = FlagSyncCoordinator::new(transport, config.flag_batch_sizes);
        Self {
            config,
            people,
            prefs,
            alert_words,
            recent,
            echoes: EchoTracker::new(),
            messages,
            reactions,
            notifications,
            flags,
        }
    }

    /// The current user.
    pub fn user_id(&self) -> UserId {
        self.config.user_id
    }

    // ── Collaborator access ─────────────────────────────────────────────

    /// The people directory.
    pub fn people(&self) -> &People {
        &self.people
    }

    /// Mute/follow state and notification preferences.
    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    /// The current user's alert words.
    pub fn alert_words(&self) -> &AlertWords {
        &self.alert_words
    }

    /// Recency indices (recent senders, topic history).
    pub fn recent(&self) -> &RecentIndices {
        &self.recent
    }

    /// The message cache.
    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// The notification deduplicator.
    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    /// The flag-sync coordinator.
    pub fn flag_sync(&self) -> &FlagSyncCoordinator {
        &self.flags
    }

    /// Install the notification click-navigation callback.
    pub fn set_navigate(&self, navigate: NavigateFn) {
        self.notifications.set_navigate(navigate);
    }

    // ── Event ingestion ─────────────────────────────────────────────────

    /// Apply a batch of raw events in delivery order.
    ///
    /// Integrity violations are logged and dropped; one malformed event
    /// never aborts the remainder of the batch.
    pub fn apply_events(&self, events: Vec<Value>) {
        for value in events {
            if let Err(err) = self.apply_raw_event(value) {
                if err.is_integrity_violation() {
                    tracing::warn!(error = %err, "Dropping event after integrity violation");
                } else {
                    tracing::warn!(error = %err, "Dropping undeliverable event");
                }
            }
        }
    }

    /// Validate and apply a single raw event.
    pub fn apply_raw_event(&self, value: Value) -> Result<()> {
        self.apply_event(Event::parse(value)?)
    }

    /// Apply a single validated event.
    pub fn apply_event(&self, event: Event) -> Result<()> {
        match event {
            Event::Message { message } => {
                let entry = self.messages.process_new_message(message);
                self.maybe_notify_message(&entry);
                Ok(())
            }

            Event::Reaction { op, message_id, user_id, emoji_name, emoji_code, reaction_type } => {
                let raw = RawReaction {
                    emoji_name,
                    emoji_code,
                    reaction_type,
                    user_id,
                };
                self.handle_reaction(op, message_id, raw);
                Ok(())
            }

            Event::UpdateMessageFlags { op, flag, messages } => {
                self.messages
                    .apply_flag_update(&messages, &flag, op == EventOp::Add);
                Ok(())
            }

            Event::UserUpdate { user_id, full_name, avatar_url, status_emoji } => {
                if let Some(name) = &full_name {
                    self.people.set_full_name(user_id, name);
                    self.messages.update_sender_full_name(user_id, name);
                }
                if let Some(url) = &avatar_url {
                    self.people.set_avatar_url(user_id, Some(url));
                    self.messages.update_small_avatar_url(user_id, Some(url));
                }
                if let Some(emoji) = status_emoji {
                    self.people.set_status_emoji(user_id, Some(emoji.clone()));
                    self.messages.update_status_emoji_info(user_id, Some(emoji));
                }
                Ok(())
            }

            Event::StreamUpdate { stream_id, name } => {
                self.messages.update_stream_name(stream_id, &name);
                Ok(())
            }

            Event::MessageAck { echo_key, message_id, sender_id } => {
                self.confirm_local_message(echo_key, message_id, sender_id)
            }

            Event::Submessage { message_id, submessage_id, sender_id, msg_type, content } => {
                let submessage = crate::message::Submessage {
                    id: submessage_id,
                    sender_id,
                    msg_type,
                    content,
                };
                self.messages.add_submessage(message_id, submessage)
            }
        }
    }

    fn handle_reaction(&self, op: EventOp, message_id: MessageId, raw: RawReaction) {
        if !self.ensure_aggregated(message_id) {
            // Message not cached locally yet; the aggregate will be built
            // from scratch when it is fetched.
            tracing::debug!(
                message_id = message_id.0,
                "Reaction event for uncached message; dropping"
            );
            return;
        }
        match op {
            EventOp::Add => {
                self.reactions.add_reaction(message_id, &raw);
                self.maybe_notify_reaction(message_id, &raw);
            }
            EventOp::Remove => self.reactions.remove_reaction(message_id, &raw),
        }
    }

    // ── Local echo lifecycle ────────────────────────────────────────────

    /// Insert a locally-composed message under a temporary id, ahead of
    /// server acknowledgment.
    pub fn send_local_message(&self, draft: LocalMessageDraft) -> MessageRef {
        let raw = self.echoes.build_raw(self.config.user_id, draft);
        self.messages.process_new_message(raw)
    }

    /// Reify a local echo: rename the cache entry and move every keyed
    /// derived state from the temporary id to the permanent one.
    pub fn confirm_local_message(
        &self,
        echo_key: uuid::Uuid,
        new_id: MessageId,
        sender_id: UserId,
    ) -> Result<()> {
        let local_id = self.echoes.confirm(echo_key, sender_id)?;
        if self.messages.reify(local_id, new_id) {
            self.reactions.rename(local_id, new_id);
            self.recent.rename(local_id, new_id);
            self.notifications.rename_reaction_notice(local_id, new_id);
            self.messages.register_reified(new_id);
        }
        Ok(())
    }

    // ── Reaction getters (rendering layer) ──────────────────────────────

    /// Aggregate the message's reactions if needed. Returns false when
    /// the message is not cached.
    fn ensure_aggregated(&self, message_id: MessageId) -> bool {
        if self.reactions.is_aggregated(message_id) {
            return true;
        }
        match self.messages.take_raw_reactions(message_id) {
            Some(raw) => {
                self.reactions.seed(message_id, raw);
                true
            }
            None => false,
        }
    }

    /// Display aggregates for a message.
    pub fn get_message_reactions(&self, message_id: MessageId) -> Vec<CleanReaction> {
        self.ensure_aggregated(message_id);
        self.reactions.get_message_reactions(message_id)
    }

    /// Vote text for one aggregate.
    pub fn get_vote_text(&self, message_id: MessageId, key: &ReactionKey) -> Option<String> {
        self.ensure_aggregated(message_id);
        self.reactions.get_vote_text(message_id, key)
    }

    /// Voter ids for one aggregate, current user first.
    pub fn user_ids(&self, message_id: MessageId, key: &ReactionKey) -> Vec<UserId> {
        self.ensure_aggregated(message_id);
        self.reactions.user_ids(message_id, key)
    }

    // ── Notifications ───────────────────────────────────────────────────

    fn maybe_notify_message(&self, entry: &MessageRef) {
        let message = entry.read().clone();
        let decision = message_notifiable(&message, self.config.user_id, &self.prefs);
        if !decision.any() {
            return;
        }
        if decision.desktop {
            self.notifications.notify_message(&message);
        }
        if decision.audible {
            // Sound playback is presentation; the shell observes this.
            tracing::debug!(message_id = message.id.0, "Audible notification due");
        }
        self.messages.set_notification_sent(message.id);
    }

    fn maybe_notify_reaction(&self, message_id: MessageId, raw: &RawReaction) {
        let Some(entry) = self.messages.get(message_id) else {
            return;
        };
        let message = entry.read().clone();
        let decision =
            reaction_notifiable(&message, raw.user_id, self.config.user_id, &self.prefs);
        if decision.desktop {
            self.notifications.notify_reaction(&message, raw);
        }
    }

    /// Evaluate eligibility for a cached message without side effects.
    pub fn notify_decision(&self, message_id: MessageId) -> Option<NotifyDecision> {
        let entry = self.messages.get(message_id)?;
        let message = entry.read().clone();
        Some(message_notifiable(
            &message,
            self.config.user_id,
            &self.prefs,
        ))
    }

    /// Focus returned to the application: every live notification is a
    /// proxy for unseen activity, so all of them come down.
    pub fn handle_window_focus(&self) {
        self.notifications.clear_all();
    }

    // ── Bulk flag operations ────────────────────────────────────────────

    /// Mark every message matching the narrow as read.
    pub async fn mark_narrow_as_read(&self, narrow: &Narrow) -> Result<BulkFlagSummary> {
        self.flags.bulk_set_flag(narrow, FlagOp::Add).await
    }

    /// Mark everything as read.
    pub async fn mark_all_as_read(&self) -> Result<BulkFlagSummary> {
        self.flags.bulk_set_flag(&Narrow::all(), FlagOp::Add).await
    }

    /// Mark one conversation unread from a message onward.
    pub async fn mark_unread_from(
        &self,
        narrow: &Narrow,
        anchor: MessageId,
    ) -> Result<BulkFlagSummary> {
        self.flags.mark_unread_from(narrow, anchor).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Drop every piece of state. Gives tests and logout a clean slate.
    pub fn reset(&self) {
        self.messages.clear();
        self.reactions.clear();
        self.notifications.clear_all();
        self.recent.clear();
        self.echoes.clear();
        self.people.clear();
        self.prefs.clear();
        self.alert_words.clear();
        tracing::info!("Client core reset");
    }
}

// ============================================================================
// TESTS
// ============================================================================
