//! # Reaction Aggregator
//!
//! Compresses raw per-user reaction records into per-emoji display
//! aggregates with a stable vote-count/voter-name policy.
//!
//! Per message the aggregator is a two-state machine: *unaggregated*
//! (the raw reaction list still lives on the cached message) and
//! *aggregated* (this store owns the aggregate map, the raw list has been
//! drained and is never consulted again). The transition happens the
//! first time anything touches the message's reactions.
//!
//! The vote text of every aggregate on a message is a function of the
//! total vote count across *all* emoji on that message, so any change to
//! one aggregate refreshes the vote text of every aggregate on the
//! message.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::people::People;
use crate::prefs::Prefs;
use crate::types::{MessageId, UserId};

/// Total votes at or below which voter names are shown instead of counts.
pub const VOTE_NAME_THRESHOLD: usize = 3;

/// Kind of emoji behind a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    /// A plain unicode emoji.
    UnicodeEmoji,
    /// A custom emoji uploaded to the server.
    CustomEmoji,
    /// A built-in extra emoji shipped with the product.
    ExtraEmoji,
}

/// A raw per-user reaction record, as carried on message payloads and
/// reaction events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReaction {
    /// Emoji shortname, e.g. `"thumbs_up"`.
    pub emoji_name: String,
    /// Codepoint or custom-emoji identifier.
    pub emoji_code: String,
    /// Emoji kind.
    pub reaction_type: ReactionType,
    /// The reacting user.
    pub user_id: UserId,
}

/// Aggregate key: one aggregate per (kind, code) pair per message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReactionKey {
    /// Emoji kind.
    pub reaction_type: ReactionType,
    /// Codepoint or custom-emoji identifier.
    pub emoji_code: String,
}

impl ReactionKey {
    fn of(reaction_type: ReactionType, emoji_code: &str) -> Self {
        Self {
            reaction_type,
            emoji_code: emoji_code.to_string(),
        }
    }
}

/// The aggregated, display-ready form of all reactions sharing one emoji
/// on one message.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanReaction {
    /// Emoji kind.
    pub reaction_type: ReactionType,
    /// Codepoint or custom-emoji identifier.
    pub emoji_code: String,
    /// Emoji shortname.
    pub emoji_name: String,
    /// Voters in arrival order, with the current user (if voting) first.
    pub user_ids: Vec<UserId>,
    /// Rendered vote summary: a name list or a numeric count, chosen by
    /// the whole-message threshold policy.
    pub vote_text: String,
}

impl CleanReaction {
    /// Number of votes on this emoji.
    pub fn count(&self) -> usize {
        self.user_ids.len()
    }
}

/// The reaction aggregation engine.
///
/// Holds only derived state keyed by message id; the message cache
/// invalidates it through [`ReactionStore::rename`] and
/// [`ReactionStore::remove`].
pub struct ReactionStore {
    my_user_id: UserId,
    people: Arc<People>,
    prefs: Arc<Prefs>,
    aggregates: RwLock<HashMap<MessageId, BTreeMap<ReactionKey, CleanReaction>>>,
}

impl ReactionStore {
    /// Create an empty store.
    pub fn new(my_user_id: UserId, people: Arc<People>, prefs: Arc<Prefs>) -> Self {
        Self {
            my_user_id,
            people,
            prefs,
            aggregates: RwLock::new(HashMap::new()),
        }
    }

    /// Whether a message has been aggregated yet.
    pub fn is_aggregated(&self, message_id: MessageId) -> bool {
        self.aggregates.read().contains_key(&message_id)
    }

    /// Build the aggregate map for a message from its raw reaction list.
    ///
    /// Duplicate raw records (same user, same emoji) collapse to one vote.
    /// Idempotent: a message that is already aggregated is left untouched.
    pub fn seed(&self, message_id: MessageId, raw: Vec<RawReaction>) {
        let mut aggregates = self.aggregates.write();
        if aggregates.contains_key(&message_id) {
            return;
        }
        let mut map: BTreeMap<ReactionKey, CleanReaction> = BTreeMap::new();
        for r in raw {
            let key = ReactionKey::of(r.reaction_type, &r.emoji_code);
            let entry = map.entry(key).or_insert_with(|| CleanReaction {
                reaction_type: r.reaction_type,
                emoji_code: r.emoji_code.clone(),
                emoji_name: r.emoji_name.clone(),
                user_ids: Vec::new(),
                vote_text: String::new(),
            });
            if !entry.user_ids.contains(&r.user_id) {
                entry.user_ids.push(r.user_id);
            }
        }
        self.refresh_vote_texts(&mut map);
        aggregates.insert(message_id, map);
    }

    /// Record one user's reaction.
    ///
    /// No-op if the message is not aggregated here (it is not cached yet;
    /// the aggregate will be correctly built from scratch when the message
    /// is fetched) or if the user already voted for this emoji (duplicate
    /// delivery).
    pub fn add_reaction(&self, message_id: MessageId, reaction: &RawReaction) {
        let mut aggregates = self.aggregates.write();
        let Some(map) = aggregates.get_mut(&message_id) else {
            tracing::debug!(
                message_id = message_id.0,
                emoji = %reaction.emoji_name,
                "Reaction add for unaggregated message; ignoring"
            );
            return;
        };
        let key = ReactionKey::of(reaction.reaction_type, &reaction.emoji_code);
        match map.get_mut(&key) {
            Some(agg) if agg.user_ids.contains(&reaction.user_id) => {
                // Duplicate delivery of the same vote.
                tracing::debug!(
                    message_id = message_id.0,
                    user_id = reaction.user_id.0,
                    emoji = %reaction.emoji_name,
                    "Duplicate reaction add; ignoring"
                );
                return;
            }
            Some(agg) => agg.user_ids.push(reaction.user_id),
            None => {
                map.insert(
                    key,
                    CleanReaction {
                        reaction_type: reaction.reaction_type,
                        emoji_code: reaction.emoji_code.clone(),
                        emoji_name: reaction.emoji_name.clone(),
                        user_ids: vec![reaction.user_id],
                        vote_text: String::new(),
                    },
                );
            }
        }
        self.refresh_vote_texts(map);
    }

    /// Remove one user's reaction.
    ///
    /// Removing a vote the user never cast is a no-op. An aggregate whose
    /// last voter leaves is deleted entirely.
    pub fn remove_reaction(&self, message_id: MessageId, reaction: &RawReaction) {
        let mut aggregates = self.aggregates.write();
        let Some(map) = aggregates.get_mut(&message_id) else {
            tracing::debug!(
                message_id = message_id.0,
                emoji = %reaction.emoji_name,
                "Reaction remove for unaggregated message; ignoring"
            );
            return;
        };
        let key = ReactionKey::of(reaction.reaction_type, &reaction.emoji_code);
        let Some(agg) = map.get_mut(&key) else {
            return;
        };
        let before = agg.user_ids.len();
        agg.user_ids.retain(|u| *u != reaction.user_id);
        if agg.user_ids.len() == before {
            return;
        }
        if agg.user_ids.is_empty() {
            map.remove(&key);
        }
        self.refresh_vote_texts(map);
    }

    // ── Getters for the rendering layer ─────────────────────────────────

    /// All aggregates on a message, in stable key order.
    pub fn get_message_reactions(&self, message_id: MessageId) -> Vec<CleanReaction> {
        self.aggregates
            .read()
            .get(&message_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Vote text for one aggregate.
    pub fn get_vote_text(&self, message_id: MessageId, key: &ReactionKey) -> Option<String> {
        self.aggregates
            .read()
            .get(&message_id)
            .and_then(|m| m.get(key))
            .map(|a| a.vote_text.clone())
    }

    /// Voter ids for one aggregate, current user first.
    pub fn user_ids(&self, message_id: MessageId, key: &ReactionKey) -> Vec<UserId> {
        self.aggregates
            .read()
            .get(&message_id)
            .and_then(|m| m.get(key))
            .map(|a| self.ordered_voters(a))
            .unwrap_or_default()
    }

    /// Total votes across every emoji on a message.
    pub fn total_votes(&self, message_id: MessageId) -> usize {
        self.aggregates
            .read()
            .get(&message_id)
            .map(|m| m.values().map(CleanReaction::count).sum())
            .unwrap_or(0)
    }

    /// Human-readable list of who reacted with one emoji: "Alice",
    /// "Alice and Bob", or "Alice and 2 others". The current user renders
    /// as "You" and sorts first.
    pub fn voter_label(&self, message_id: MessageId, key: &ReactionKey) -> Option<String> {
        let voters = {
            let aggregates = self.aggregates.read();
            let agg = aggregates.get(&message_id)?.get(key)?;
            self.ordered_voters(agg)
        };
        Some(self.label_for_voters(&voters))
    }

    /// Label form of an explicit voter list (used by notification titles,
    /// where the ordering is the notification's, not the aggregate's).
    pub fn label_for_voters(&self, voters: &[UserId]) -> String {
        let name = |u: &UserId| {
            if *u == self.my_user_id {
                "You".to_string()
            } else {
                self.people.full_name(*u)
            }
        };
        match voters {
            [] => String::new(),
            [a] => name(a),
            [a, b] => format!("{} and {}", name(a), name(b)),
            [a, rest @ ..] => format!("{} and {} others", name(a), rest.len()),
        }
    }

    // ── External invalidation ───────────────────────────────────────────

    /// Move aggregate state from `old` to `new` (reification). No-op when
    /// `old` has no state; never overwrites existing state under `new`.
    pub fn rename(&self, old: MessageId, new: MessageId) {
        let mut aggregates = self.aggregates.write();
        if aggregates.contains_key(&new) {
            tracing::warn!(
                old = old.0,
                new = new.0,
                "Reaction rename target already populated; dropping old state"
            );
            aggregates.remove(&old);
            return;
        }
        if let Some(map) = aggregates.remove(&old) {
            aggregates.insert(new, map);
        }
    }

    /// Drop all aggregate state for a message (eviction).
    pub fn remove(&self, message_id: MessageId) {
        self.aggregates.write().remove(&message_id);
    }

    /// Drop everything (test/reset hook).
    pub fn clear(&self) {
        self.aggregates.write().clear();
    }

    // ── Internal ────────────────────────────────────────────────────────

    /// Recompute every vote text on a message. The name-vs-count decision
    /// is a whole-message property, so this always runs over the full map.
    fn refresh_vote_texts(&self, map: &mut BTreeMap<ReactionKey, CleanReaction>) {
        let total: usize = map.values().map(CleanReaction::count).sum();
        let use_names =
            total <= VOTE_NAME_THRESHOLD && self.prefs.notification_prefs().display_reaction_users;
        for agg in map.values_mut() {
            agg.vote_text = if use_names {
                let voters = self.ordered_voters(agg);
                voters
                    .iter()
                    .map(|u| {
                        if *u == self.my_user_id {
                            "You".to_string()
                        } else {
                            self.people.full_name(*u)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                agg.count().to_string()
            };
        }
    }

    fn ordered_voters(&self, agg: &CleanReaction) -> Vec<UserId> {
        let mut voters = agg.user_ids.clone();
        if let Some(pos) = voters.iter().position(|u| *u == self.my_user_id) {
            let me = voters.remove(pos);
            voters.insert(0, me);
        }
        voters
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::Person;

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

    fn make_store() -> ReactionStore {
        let people = Arc::new(People::new());
        people.upsert(make_person(1, "Me"));
        people.upsert(make_person(7, "Alice"));
        people.upsert(make_person(9, "Bob"));
        people.upsert(make_person(11, "Carol"));
        ReactionStore::new(UserId(1), people, Arc::new(Prefs::new()))
    }

    fn thumbs_up(user: u64) -> RawReaction {
        RawReaction {
            emoji_name: "thumbs_up".to_string(),
            emoji_code: "1f44d".to_string(),
            reaction_type: ReactionType::UnicodeEmoji,
            user_id: UserId(user),
        }
    }

    fn tada(user: u64) -> RawReaction {
        RawReaction {
            emoji_name: "tada".to_string(),
            emoji_code: "1f389".to_string(),
            reaction_type: ReactionType::UnicodeEmoji,
            user_id: UserId(user),
        }
    }

    fn key(r: &RawReaction) -> ReactionKey {
        ReactionKey::of(r.reaction_type, &r.emoji_code)
    }

    #[test]
    fn test_seed_collapses_duplicates() {
        let store = make_store();
        store.seed(MessageId(42), vec![thumbs_up(7), thumbs_up(7), thumbs_up(9)]);

        let reactions = store.get_message_reactions(MessageId(42));
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].user_ids, vec![UserId(7), UserId(9)]);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = make_store();
        store.seed(MessageId(42), vec![thumbs_up(7)]);
        store.seed(MessageId(42), vec![thumbs_up(7), thumbs_up(9), tada(11)]);

        // Second seed must not rebuild from raw
        assert_eq!(store.total_votes(MessageId(42)), 1);
    }

    #[test]
    fn test_add_reaction_idempotent() {
        let store = make_store();
        store.seed(MessageId(42), vec![]);

        store.add_reaction(MessageId(42), &thumbs_up(7));
        store.add_reaction(MessageId(42), &thumbs_up(7));

        let reactions = store.get_message_reactions(MessageId(42));
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].count(), 1);
    }

    #[test]
    fn test_remove_nonvoter_is_noop() {
        let store = make_store();
        store.seed(MessageId(42), vec![thumbs_up(7)]);

        store.remove_reaction(MessageId(42), &thumbs_up(9));
        assert_eq!(store.total_votes(MessageId(42)), 1);
    }

    #[test]
    fn test_remove_last_voter_deletes_aggregate() {
        let store = make_store();
        store.seed(MessageId(42), vec![thumbs_up(7), tada(9)]);

        store.remove_reaction(MessageId(42), &thumbs_up(7));
        let reactions = store.get_message_reactions(MessageId(42));
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji_name, "tada");
    }

    #[test]
    fn test_unknown_message_is_silent_noop() {
        let store = make_store();
        store.add_reaction(MessageId(404), &thumbs_up(7));
        store.remove_reaction(MessageId(404), &thumbs_up(7));
        assert!(store.get_message_reactions(MessageId(404)).is_empty());
    }

    #[test]
    fn test_vote_text_threshold_boundary() {
        let store = make_store();
        // 3 total votes across two emoji: names
        store.seed(MessageId(42), vec![thumbs_up(7), thumbs_up(9), tada(11)]);

        let up = store.get_vote_text(MessageId(42), &key(&thumbs_up(7))).unwrap();
        assert_eq!(up, "Alice, Bob");
        let t = store.get_vote_text(MessageId(42), &key(&tada(11))).unwrap();
        assert_eq!(t, "Carol");

        // A 4th vote anywhere flips every aggregate to counts
        store.add_reaction(MessageId(42), &tada(7));
        let up = store.get_vote_text(MessageId(42), &key(&thumbs_up(7))).unwrap();
        assert_eq!(up, "2");
        let t = store.get_vote_text(MessageId(42), &key(&tada(11))).unwrap();
        assert_eq!(t, "2");
    }

    #[test]
    fn test_vote_text_flips_back_on_removal() {
        let store = make_store();
        store.seed(
            MessageId(42),
            vec![thumbs_up(7), thumbs_up(9), tada(11), tada(7)],
        );
        assert_eq!(
            store.get_vote_text(MessageId(42), &key(&tada(11))).unwrap(),
            "2"
        );

        store.remove_reaction(MessageId(42), &tada(7));
        assert_eq!(
            store.get_vote_text(MessageId(42), &key(&tada(11))).unwrap(),
            "Carol"
        );
    }

    #[test]
    fn test_names_pref_off_forces_counts() {
        let people = Arc::new(People::new());
        people.upsert(make_person(7, "Alice"));
        let prefs = Arc::new(Prefs::new());
        let mut np = prefs.notification_prefs();
        np.display_reaction_users = false;
        prefs.set_notification_prefs(np);

        let store = ReactionStore::new(UserId(1), people, prefs);
        store.seed(MessageId(42), vec![thumbs_up(7)]);
        assert_eq!(
            store.get_vote_text(MessageId(42), &key(&thumbs_up(7))).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_current_user_renders_as_you_and_sorts_first() {
        let store = make_store();
        store.seed(MessageId(42), vec![thumbs_up(7), thumbs_up(1)]);

        assert_eq!(
            store.get_vote_text(MessageId(42), &key(&thumbs_up(1))).unwrap(),
            "You, Alice"
        );
        assert_eq!(
            store.user_ids(MessageId(42), &key(&thumbs_up(1))),
            vec![UserId(1), UserId(7)]
        );
    }

    #[test]
    fn test_voter_labels() {
        let store = make_store();
        assert_eq!(store.label_for_voters(&[UserId(7)]), "Alice");
        assert_eq!(store.label_for_voters(&[UserId(7), UserId(9)]), "Alice and Bob");
        assert_eq!(
            store.label_for_voters(&[UserId(7), UserId(9), UserId(11)]),
            "Alice and 2 others"
        );
    }

    #[test]
    fn test_rename_moves_state_once() {
        let store = make_store();
        store.seed(MessageId(42), vec![thumbs_up(7)]);

        store.rename(MessageId(42), MessageId(100));
        assert!(store.get_message_reactions(MessageId(42)).is_empty());
        assert_eq!(store.total_votes(MessageId(100)), 1);

        // Renaming an absent id is a no-op
        store.rename(MessageId(42), MessageId(200));
        assert!(store.get_message_reactions(MessageId(200)).is_empty());
    }
}
