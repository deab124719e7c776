//! # Deposit Chain Metrics
//!
//! Prometheus metrics for deposit chain access.
//!
//! Enable with the `metrics` feature.
//!
//! ## Metrics Exported
//!
//! - `deposit_chain_requests_total` - Requests submitted (by method)
//! - `deposit_chain_request_failures_total` - Requests failed (by method)
//! - `deposit_chain_tracked_blocks` - Blocks held in the external-data cache

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref REQUESTS: IntCounterVec = register_int_counter_vec!(
        "deposit_chain_requests_total",
        "Total number of deposit chain requests submitted",
        &["method"]
    )
    .expect("Failed to create REQUESTS metric");

    pub static ref REQUEST_FAILURES: IntCounterVec = register_int_counter_vec!(
        "deposit_chain_request_failures_total",
        "Total number of failed deposit chain requests",
        &["method"]
    )
    .expect("Failed to create REQUEST_FAILURES metric");

    pub static ref TRACKED_BLOCKS: IntGauge = register_int_gauge!(
        "deposit_chain_tracked_blocks",
        "Blocks held in the external-data cache"
    )
    .expect("Failed to create TRACKED_BLOCKS metric");
}

#[cfg(feature = "metrics")]
pub fn record_request_submitted(method: &str) {
    REQUESTS.with_label_values(&[method]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_request_failed(method: &str) {
    REQUEST_FAILURES.with_label_values(&[method]).inc();
}

#[cfg(feature = "metrics")]
pub fn set_tracked_blocks(count: usize) {
    TRACKED_BLOCKS.set(count as i64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_request_submitted(_method: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_request_failed(_method: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn set_tracked_blocks(_count: usize) {}
