//! Prometheus metrics for the beacon node.
//!
//! All metrics follow the naming convention: `qc_<area>_<metric>_<unit>`.
//! Subsystem crates register their own metrics in the default registry when
//! built with their `metrics` feature; `encode_metrics` exports both.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Node registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CHAIN HEAD
    // =========================================================================

    /// Slot of the current head block
    pub static ref HEAD_SLOT: IntGauge = IntGauge::new(
        "qc_chain_head_slot",
        "Slot of the current head block"
    ).expect("metric creation failed");

    /// Latest justified epoch
    pub static ref JUSTIFIED_EPOCH: IntGauge = IntGauge::new(
        "qc_chain_justified_epoch",
        "Epoch of the current justified checkpoint"
    ).expect("metric creation failed");

    /// Latest finalized epoch
    pub static ref FINALIZED_EPOCH: IntGauge = IntGauge::new(
        "qc_chain_finalized_epoch",
        "Epoch of the finalized checkpoint"
    ).expect("metric creation failed");

    /// Blocks imported into the head
    pub static ref BLOCKS_IMPORTED: IntCounter = IntCounter::new(
        "qc_chain_blocks_imported_total",
        "Total number of blocks imported"
    ).expect("metric creation failed");

    /// Block import duration
    pub static ref BLOCK_IMPORT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "qc_chain_block_import_duration_seconds",
            "Time spent advancing and applying imported blocks"
        ).buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT BUS
    // =========================================================================

    /// Events published by the slot clock
    pub static ref CLOCK_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("qc_clock_events_total", "Slot clock events published"),
        &["event"]
    ).expect("metric creation failed");

    // =========================================================================
    // ERRORS
    // =========================================================================

    /// Errors by subsystem
    pub static ref SUBSYSTEM_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("qc_subsystem_errors_total", "Errors by subsystem and type"),
        &["subsystem", "error_type"]
    ).expect("metric creation failed");
}

/// Register the node metrics with [`REGISTRY`].
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HEAD_SLOT.clone()),
        Box::new(JUSTIFIED_EPOCH.clone()),
        Box::new(FINALIZED_EPOCH.clone()),
        Box::new(BLOCKS_IMPORTED.clone()),
        Box::new(BLOCK_IMPORT_DURATION.clone()),
        Box::new(CLOCK_EVENTS.clone()),
        Box::new(SUBSYSTEM_ERRORS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode node and subsystem metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut metric_families = REGISTRY.gather();
    metric_families.extend(prometheus::gather());
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_encode() {
        // Registration is global; a second registration in the same process fails.
        let _ = register_metrics();
        HEAD_SLOT.set(17);
        let text = encode_metrics().unwrap();
        assert!(text.contains("qc_chain_head_slot 17"));
    }

    #[test]
    fn test_histogram_timer() {
        let before = BLOCK_IMPORT_DURATION.get_sample_count();
        {
            let _timer = HistogramTimer::new(&BLOCK_IMPORT_DURATION);
        }
        assert_eq!(BLOCK_IMPORT_DURATION.get_sample_count(), before + 1);
    }
}
