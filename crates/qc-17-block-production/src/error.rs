//! Error types for block production
//!
//! Assembly fails only when the state transition it performs fails, so the
//! error type is the transition engine's. Slot, epoch and block faults stay
//! distinguishable for the caller.

pub use qc_04_state_transition::StateTransitionError;

/// Result type alias for block production operations
pub type Result<T> = std::result::Result<T, StateTransitionError>;
