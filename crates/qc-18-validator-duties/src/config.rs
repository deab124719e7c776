//! Configuration for validator duties

use serde::Deserialize;
use shared_types::{ConfigError, Epoch};
use std::time::Duration;

/// Backoff applied between failed duty loads.
///
/// Delay before retry `n` (1-based) is
/// `min(initial_delay_ms * backoff_multiplier^(n-1), max_delay_ms)`, plus a
/// deterministic jitter of up to a quarter of that when `jitter` is set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Attempts before giving up. `None` retries until the epoch leaves the
    /// duty window.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::invalid("retry.initial_delay_ms", "must be positive"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be below initial_delay_ms",
            ));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ConfigError::invalid(
                "retry.backoff_multiplier",
                "must be a finite value of at least 1.0",
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    /// Delay to wait after failed attempt `attempt` (1-based) to load `epoch`.
    pub fn delay_for(&self, epoch: Epoch, attempt: u32) -> Duration {
        Duration::from_millis(crate::domain::backoff_delay_ms(self, epoch, attempt))
    }
}

/// Runtime configuration for the duty orchestrator
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DutyOrchestratorConfig {
    pub retry: RetryPolicy,

    /// Duty loads running against the node at once
    pub max_concurrent_loads: usize,

    /// Epochs beyond the current one whose duties are loaded ahead
    pub lookahead_epochs: u64,

    /// Delay from slot start to producing attestations
    pub attestation_delay_ms: u64,

    /// Delay from slot start to producing aggregates
    pub aggregation_delay_ms: u64,
}

impl Default for DutyOrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrent_loads: 2,
            lookahead_epochs: 1,
            attestation_delay_ms: 4_000,
            aggregation_delay_ms: 8_000,
        }
    }
}

impl DutyOrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if self.max_concurrent_loads == 0 {
            return Err(ConfigError::invalid("max_concurrent_loads", "must be at least 1"));
        }
        if self.aggregation_delay_ms < self.attestation_delay_ms {
            return Err(ConfigError::invalid(
                "aggregation_delay_ms",
                "must not be below attestation_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn attestation_delay(&self) -> Duration {
        Duration::from_millis(self.attestation_delay_ms)
    }

    pub fn aggregation_delay(&self) -> Duration {
        Duration::from_millis(self.aggregation_delay_ms)
    }
}
