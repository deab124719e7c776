//! # Duty Orchestration Service
//!
//! - `fork`: per-epoch fork context shared by concurrent duties
//! - `loader`: duty set construction, gated and retried
//! - `executor`: one task per duty, outcomes reported on a channel
//! - `orchestrator`: epoch state machine driven by timing signals

mod executor;
mod fork;
mod loader;
mod orchestrator;

pub use executor::DutyReport;
pub use fork::ForkProvider;
pub use loader::{DutyLoader, RetryingDutyLoader, ValidatorApiDutyLoader};
pub use orchestrator::{DutyOrchestrator, EpochStatus};

#[cfg(test)]
mod mocks;
#[cfg(test)]
mod tests;
