//! # Alert Words
//!
//! Per-user alert-word list and the content scan that feeds the
//! `alerted` flag during message normalization.

use parking_lot::RwLock;

/// The current user's alert words.
pub struct AlertWords {
    words: RwLock<Vec<String>>,
}

impl AlertWords {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            words: RwLock::new(Vec::new()),
        }
    }

    /// Replace the word list.
    pub fn set_words<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.words.write() = words
            .into_iter()
            .map(|w| w.into().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
    }

    /// Whether `content` contains any alert word.
    ///
    /// Matching is case-insensitive and requires word boundaries on both
    /// sides, so "rust" does not fire inside "trust".
    pub fn matches(&self, content: &str) -> bool {
        let words = self.words.read();
        if words.is_empty() {
            return false;
        }
        let haystack = content.to_lowercase();
        words.iter().any(|w| contains_word(&haystack, w))
    }

    /// Drop all words (test/reset hook).
    pub fn clear(&self) {
        self.words.write().clear();
    }
}

impl Default for AlertWords {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before_ok = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = end == haystack.len()
            || !haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = begin + needle.len().max(1);
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundary_matching() {
        let alerts = AlertWords::new();
        alerts.set_words(["rust"]);

        assert!(alerts.matches("I love Rust a lot"));
        assert!(alerts.matches("rust."));
        assert!(alerts.matches("(rust)"));
        assert!(!alerts.matches("in trust we trust"));
        assert!(!alerts.matches("rusty nails"));
    }

    #[test]
    fn test_case_insensitive() {
        let alerts = AlertWords::new();
        alerts.set_words(["Deploy"]);
        assert!(alerts.matches("DEPLOY now"));
        assert!(alerts.matches("please deploy"));
    }

    #[test]
    fn test_empty_list_never_matches() {
        let alerts = AlertWords::new();
        assert!(!alerts.matches("anything at all"));

        alerts.set_words([""]);
        assert!(!alerts.matches("anything at all"));
    }

    #[test]
    fn test_later_occurrence_matches() {
        let alerts = AlertWords::new();
        alerts.set_words(["db"]);
        // First occurrence fails the boundary check, second passes.
        assert!(alerts.matches("mydb uses a db"));
    }
}
