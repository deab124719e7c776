//! # Validator Duty Metrics
//!
//! Prometheus metrics for duty loading and execution.
//!
//! Enable with the `metrics` feature.
//!
//! ## Metrics Exported
//!
//! - `validator_duty_loads_total` - Finished duty loads (by outcome)
//! - `validator_duty_load_retries_total` - Failed load attempts followed by a retry
//! - `validator_duties_dispatched_total` - Duties started (by kind)
//! - `validator_duties_failed_total` - Duties that reported an error (by kind)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref DUTY_LOADS: IntCounterVec = register_int_counter_vec!(
        "validator_duty_loads_total",
        "Total number of finished duty loads",
        &["outcome"]
    )
    .expect("Failed to create DUTY_LOADS metric");

    pub static ref DUTY_LOAD_RETRIES: IntCounter = register_int_counter!(
        "validator_duty_load_retries_total",
        "Total number of duty load attempts that were retried"
    )
    .expect("Failed to create DUTY_LOAD_RETRIES metric");

    pub static ref DUTIES_DISPATCHED: IntCounterVec = register_int_counter_vec!(
        "validator_duties_dispatched_total",
        "Total number of duties dispatched",
        &["kind"]
    )
    .expect("Failed to create DUTIES_DISPATCHED metric");

    pub static ref DUTIES_FAILED: IntCounterVec = register_int_counter_vec!(
        "validator_duties_failed_total",
        "Total number of duties that failed",
        &["kind"]
    )
    .expect("Failed to create DUTIES_FAILED metric");
}

#[cfg(feature = "metrics")]
pub fn record_duty_load(outcome: &str) {
    DUTY_LOADS.with_label_values(&[outcome]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_duty_load_retry() {
    DUTY_LOAD_RETRIES.inc();
}

#[cfg(feature = "metrics")]
pub fn record_duty_dispatched(kind: &str) {
    DUTIES_DISPATCHED.with_label_values(&[kind]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_duty_failed(kind: &str) {
    DUTIES_FAILED.with_label_values(&[kind]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_duty_load(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_duty_load_retry() {}

#[cfg(not(feature = "metrics"))]
pub fn record_duty_dispatched(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_duty_failed(_kind: &str) {}
