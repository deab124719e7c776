//! # State Transition Metrics
//!
//! Prometheus metrics for the state transition engine.
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-04-state-transition = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `state_transition_slots_processed_total` - Empty slots processed
//! - `state_transition_epochs_processed_total` - Epoch boundaries processed
//! - `state_transition_blocks_applied_total` - Blocks applied
//! - `state_transition_blocks_rejected_total` - Blocks rejected (by error kind)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref SLOTS_PROCESSED: IntCounter = register_int_counter!(
        "state_transition_slots_processed_total",
        "Total number of slots processed"
    )
    .expect("Failed to create SLOTS_PROCESSED metric");

    pub static ref EPOCHS_PROCESSED: IntCounter = register_int_counter!(
        "state_transition_epochs_processed_total",
        "Total number of epoch boundaries processed"
    )
    .expect("Failed to create EPOCHS_PROCESSED metric");

    pub static ref BLOCKS_APPLIED: IntCounter = register_int_counter!(
        "state_transition_blocks_applied_total",
        "Total number of blocks applied"
    )
    .expect("Failed to create BLOCKS_APPLIED metric");

    pub static ref BLOCKS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "state_transition_blocks_rejected_total",
        "Total number of blocks rejected",
        &["kind"]
    )
    .expect("Failed to create BLOCKS_REJECTED metric");
}

#[cfg(feature = "metrics")]
pub fn record_slots_processed(count: u64) {
    SLOTS_PROCESSED.inc_by(count);
}

#[cfg(feature = "metrics")]
pub fn record_epoch_processed() {
    EPOCHS_PROCESSED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_block_applied() {
    BLOCKS_APPLIED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_block_rejected(kind: &str) {
    BLOCKS_REJECTED.with_label_values(&[kind]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_slots_processed(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_epoch_processed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_applied() {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_rejected(_kind: &str) {}
