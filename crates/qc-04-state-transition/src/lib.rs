//! # qc-04-state-transition
//!
//! Deterministic state transition for the beacon chain.
//!
//! ## Overview
//!
//! - **Slot processing**: state-root caching, randao mix rotation and
//!   recent block-root bookkeeping for every slot crossed
//! - **Epoch processing**: Casper FFG justification/finalization, rewards
//!   and penalties, registry and effective-balance updates
//! - **Block processing**: header, randao, external-data vote, proposer
//!   slashings, attestations and deposits
//! - **Block creation**: packs operations and fills the state root
//!
//! ## Determinism
//!
//! For the same `(state, slot)` or `(state, block)` input every operation
//! returns a bit-identical state. Transitions never mutate their input.
//!
//! ```text
//! advance(advance(s, m), t) == advance(s, t)     for s.slot <= m <= t
//! advance(s, s.slot)        == s
//! ```
//!
//! ## Errors
//!
//! `SlotProcessingError`, `EpochProcessingError` and `BlockProcessingError`
//! are distinct kinds wrapped by `StateTransitionError`. None of them is
//! retryable.
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_04_state_transition::StateTransitionEngine;
//!
//! let engine = StateTransitionEngine::new(constants)?;
//! let advanced = engine.advance(&state, block.slot)?;
//! let next = engine.apply_block(&advanced, &block)?;
//! ```

pub mod domain;
pub mod engine;
pub mod error;
mod metrics;

pub use domain::{EpochCommittees, EpochSummary};
pub use engine::{BlockContents, StateTransitionEngine};
pub use error::{
    AttestationError, BlockProcessingError, CommitteeError, EpochProcessingError, Result,
    SlotProcessingError, StateTransitionError,
};
