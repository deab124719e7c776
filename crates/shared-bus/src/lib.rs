//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! Delivers one logical timeline (slot and epoch starts) and chain-head
//! events to any number of subscribers.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────────┐
//! │  Slot clock  │    publish()       │ Duty orchestrator│
//! │              │ ──────┐            │ Subnet tracker   │
//! └──────────────┘       │            └──────────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery
//!
//! - Every subscriber sees events in publication order.
//! - Publishing never blocks. A subscriber that falls more than the channel
//!   capacity behind skips the oldest events and is told how many.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{ChainEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::Subscription;

/// Maximum events to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
