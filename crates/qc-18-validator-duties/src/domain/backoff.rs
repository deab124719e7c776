//! Retry delay computation.

use crate::config::RetryPolicy;
use shared_types::Epoch;

/// Delay in milliseconds after failed attempt `attempt` (1-based) to load
/// `epoch`.
///
/// Exponential growth capped at `max_delay_ms`. Jitter is derived from the
/// epoch and the attempt number, so the schedule is reproducible while loads
/// for different epochs do not retry in lockstep.
pub fn backoff_delay_ms(policy: &RetryPolicy, epoch: Epoch, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let scaled = policy.initial_delay_ms as f64 * policy.backoff_multiplier.powi(exponent);
    let base = if scaled.is_finite() && scaled < policy.max_delay_ms as f64 {
        scaled as u64
    } else {
        policy.max_delay_ms
    };

    if !policy.jitter {
        return base;
    }
    let mixed = epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (attempt as u64).wrapping_mul(7919).wrapping_add(104_729);
    let jitter = (mixed ^ (mixed >> 29)) % (base / 4 + 1);
    base.saturating_add(jitter).min(policy.max_delay_ms)
}
