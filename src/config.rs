//! # Configuration
//!
//! Construction-time configuration for the engine. Plain data, injected
//! into [`crate::engine::ClientCore`] rather than read from ambient state.

use crate::types::UserId;

/// Page sizing for bulk flag synchronization.
///
/// The first page is kept smaller so a cold cache gets visible progress
/// quickly; later pages use the larger steady-state size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizes {
    /// Messages requested on the first page of a bulk operation.
    pub first: usize,
    /// Messages requested on every subsequent page.
    pub rest: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self { first: 1000, rest: 5000 }
    }
}

/// Configuration for constructing the engine.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// The current user. Messages from this id never notify.
    pub user_id: UserId,
    /// Page sizing for bulk flag synchronization.
    pub flag_batch_sizes: BatchSizes,
    /// Enable verbose logging
    pub verbose_logging: bool,
}

impl CoreConfig {
    /// Create a config for the given current user with default sizing.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            flag_batch_sizes: BatchSizes::default(),
            verbose_logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_sizes() {
        let sizes = BatchSizes::default();
        assert_eq!(sizes.first, 1000);
        assert_eq!(sizes.rest, 5000);
        assert!(sizes.first <= sizes.rest);
    }
}
