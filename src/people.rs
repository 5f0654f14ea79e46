//! # People Directory
//!
//! User id to display-record lookup used to resolve sender and voter
//! display data. The directory tolerates unknown ids: lookups log and
//! return `None`, display helpers fall back to a placeholder name. A
//! missing user must never be fatal because message traffic can reference
//! users the client has not fetched yet.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::UserId;

/// Display name used when a user id cannot be resolved.
pub const UNKNOWN_USER_NAME: &str = "Unknown user";

/// Inline status emoji shown next to a user's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEmojiInfo {
    /// Emoji shortname, e.g. `"car"`.
    pub emoji_name: String,
    /// Codepoint or custom-emoji identifier.
    pub emoji_code: String,
}

/// A user record as the directory knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Server-assigned user id.
    pub user_id: UserId,
    /// Full display name.
    pub full_name: String,
    /// Email address.
    pub email: String,
    /// Small avatar URL, if the server provided one.
    pub avatar_url: Option<String>,
    /// Whether this account is a bot.
    pub is_bot: bool,
    /// Current status emoji, if set.
    pub status_emoji: Option<StatusEmojiInfo>,
}

/// The people directory.
///
/// Owned by the engine; all mutation goes through `&self` methods so the
/// directory can be shared with the message cache and the aggregator.
pub struct People {
    by_id: RwLock<HashMap<UserId, Person>>,
}

impl People {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a person record.
    pub fn upsert(&self, person: Person) {
        self.by_id.write().insert(person.user_id, person);
    }

    /// Look up a person by id.
    ///
    /// Unknown ids are logged and return `None`; callers that need a name
    /// should prefer [`People::full_name`].
    pub fn get(&self, user_id: UserId) -> Option<Person> {
        let found = self.by_id.read().get(&user_id).cloned();
        if found.is_none() {
            tracing::warn!(user_id = user_id.0, "Lookup for unknown user id");
        }
        found
    }

    /// Look up a person without logging a miss.
    ///
    /// Used on paths where absence is routine (e.g. checking whether a
    /// voter is known before rendering).
    pub fn maybe_get(&self, user_id: UserId) -> Option<Person> {
        self.by_id.read().get(&user_id).cloned()
    }

    /// Full display name for a user, with a placeholder fallback.
    pub fn full_name(&self, user_id: UserId) -> String {
        match self.by_id.read().get(&user_id) {
            Some(p) => p.full_name.clone(),
            None => {
                tracing::warn!(user_id = user_id.0, "Rendering name for unknown user id");
                UNKNOWN_USER_NAME.to_string()
            }
        }
    }

    /// Update a user's full name. Returns false if the user is unknown.
    pub fn set_full_name(&self, user_id: UserId, full_name: &str) -> bool {
        match self.by_id.write().get_mut(&user_id) {
            Some(p) => {
                p.full_name = full_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Update a user's avatar URL. Returns false if the user is unknown.
    pub fn set_avatar_url(&self, user_id: UserId, avatar_url: Option<&str>) -> bool {
        match self.by_id.write().get_mut(&user_id) {
            Some(p) => {
                p.avatar_url = avatar_url.map(|s| s.to_string());
                true
            }
            None => false,
        }
    }

    /// Update a user's status emoji. Returns false if the user is unknown.
    pub fn set_status_emoji(&self, user_id: UserId, info: Option<StatusEmojiInfo>) -> bool {
        match self.by_id.write().get_mut(&user_id) {
            Some(p) => {
                p.status_emoji = info;
                true
            }
            None => false,
        }
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.read().is_empty()
    }

    /// Drop every record (test/reset hook).
    pub fn clear(&self) {
        self.by_id.write().clear();
    }
}

impl Default for People {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
