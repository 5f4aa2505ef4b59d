//! # Shared Bus - Session Fan-Out
//!
//! Delivers coordinator state changes to every connection subscribed to a
//! session.
//!
//! ## Delivery Rules
//!
//! - **One channel per session:** all event kinds of a session travel through
//!   the same channel, so a subscriber observes them in publish order.
//! - **Sequenced:** every envelope carries a per-session sequence number
//!   stamped at publish time.
//! - **Audience filtering:** an envelope targets everyone, everyone but the
//!   originator, or a single connection.
//! - **Fire-and-forget:** publishing never waits for subscribers.
//!
//! ```text
//! ┌──────────────┐  publish()   ┌──────────────┐  recv()   ┌────────────┐
//! │ Coordinator  │ ───────────→ │ session room │ ────────→ │ connection │
//! │ bus adapter  │              │  (broadcast) │ ────────→ │ connection │
//! └──────────────┘              └──────────────┘           └────────────┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{Audience, EventKind, SessionEnvelope, SessionEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventSubscriber, Subscription, SubscriptionError};

/// Maximum events buffered per session room before slow subscribers lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
