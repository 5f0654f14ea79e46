//! # Perch Core
//!
//! The client-resident state engine of the Perch chat client: a
//! consistent, de-duplicated view of messages, reactions and read state,
//! plus the decisions about when and how to surface desktop
//! notifications.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          PERCH CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐  ┌──────────────┐   │
//! │  │   Message   │  │  Reactions  │  │ Notifications│  │  Flag Sync   │   │
//! │  │   Cache     │  │             │  │              │  │              │   │
//! │  │ - Normalize │  │ - Aggregate │  │ - Eligibility│  │ - Paging     │   │
//! │  │ - Reify     │  │ - Vote text │  │ - Dedup/merge│  │ - Backoff    │   │
//! │  │ - Broadcast │  │ - Labels    │  │ - Focus clear│  │ - Progress   │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘  └──────┬───────┘   │
//! │         │                │                │                 │           │
//! │         └────────────────┴───────┬────────┴─────────────────┘           │
//! │                                  │                                      │
//! │  ┌─────────────┐  ┌─────────────┐│┌─────────────────────────────────┐   │
//! │  │   People    │  │    Prefs    │││           Engine                │   │
//! │  │             │  │             │◄┘                                 │   │
//! │  │ - Directory │  │ - Mutes     │ │ - Event routing                 │   │
//! │  │ - Fallbacks │  │ - Follows   │ │ - Local echo lifecycle          │   │
//! │  │ - Updates   │  │ - Switches  │ │ - Injected collaborators        │   │
//! │  └─────────────┘  └─────────────┘ └─────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`types`] - Typed identifiers (users, channels, messages)
//! - [`config`] - Construction-time configuration
//! - [`people`] - People directory (id to display record)
//! - [`prefs`] - Mute/follow state and notification preferences
//! - [`message`] - Message cache, local echo, recency indices
//! - [`reactions`] - Reaction aggregation and vote-text policy
//! - [`notifications`] - Notification eligibility and de-duplication
//! - [`narrow`] - Narrow predicates over messages
//! - [`transport`] - Async transport seam
//! - [`flags`] - Bulk read-flag synchronization
//! - [`event`] - Typed event ingestion boundary
//! - [`engine`] - The owned [`engine::ClientCore`] tying it together
//!
//! ## Concurrency Model
//!
//! Everything runs on one logical thread of interleaved async callbacks.
//! Suspension points are exactly the flag-sync requests and their backoff
//! timers; between them, cache and aggregate mutations are atomic with
//! respect to each other. Events tolerate duplicate delivery (idempotent
//! add/remove) but not reordering, which the transport prevents.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod flags;
pub mod message;
pub mod narrow;
pub mod notifications;
pub mod people;
pub mod prefs;
pub mod reactions;
pub mod transport;
/// Time utilities shared by every module.
pub mod time;
pub mod types;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{BatchSizes, CoreConfig};
pub use engine::ClientCore;
pub use error::{Error, Result};
pub use types::{MessageId, StreamId, UserId};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Perch Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
