//! # Chain Events
//!
//! Events that flow through the shared bus. The slot clock publishes the
//! timeline; the node publishes what happened to the chain head.

use serde::{Deserialize, Serialize};
use shared_types::{Checkpoint, Epoch, Hash, Slot, ValidatorIndex};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    // =========================================================================
    // SLOT CLOCK
    // =========================================================================
    /// A slot started. Published at the slot's wall-clock start.
    SlotStarted { slot: Slot },

    /// An epoch started. Published right before the `SlotStarted` of the
    /// epoch's first slot.
    EpochStarted { epoch: Epoch },

    // =========================================================================
    // CHAIN HEAD (Subsystem 4 via the node)
    // =========================================================================
    /// A block was imported and became the head.
    BlockImported {
        slot: Slot,
        root: Hash,
        proposer_index: ValidatorIndex,
    },

    /// The finalized checkpoint moved forward.
    CheckpointFinalized(Checkpoint),
}

impl ChainEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::SlotStarted { .. } | Self::EpochStarted { .. } => EventTopic::Clock,
            Self::BlockImported { .. } | Self::CheckpointFinalized(_) => EventTopic::Chain,
        }
    }

    /// Slot the event refers to, if any.
    #[must_use]
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Self::SlotStarted { slot } | Self::BlockImported { slot, .. } => Some(*slot),
            Self::EpochStarted { .. } | Self::CheckpointFinalized(_) => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Slot and epoch boundaries.
    Clock,
    /// Head and finality changes.
    Chain,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
