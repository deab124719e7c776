//! # Quantum Chain - Validator Duties (Subsystem 18)
//!
//! **Bounded Context:** Validator Client Duty Scheduling
//! **Architecture Compliance:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! Turns wall-clock slot and epoch signals into validator work:
//! - Loads each epoch's assignments from the beacon node into an immutable
//!   `ScheduledDutySet`, retrying failed loads with backoff
//! - Dispatches the duties due at each slot (block proposal, attestation,
//!   aggregation) without blocking the signal
//! - Signs under the fork context of the duty's epoch, fetched once per
//!   epoch and shared by every duty in flight
//!
//! ## Epoch State Machine
//!
//! ```text
//!  Unloaded ──epoch/slot signal──▶ Loading ──success──▶ Loaded
//!      ▲                             │
//!      └──── unrecoverable error ────┘   (recoverable errors retry in place)
//! ```
//!
//! Slots that start while their epoch is `Loading` are queued and dispatched
//! when the load completes. A load retries until it succeeds, its epoch
//! leaves the window `[current - 1, current + lookahead]`, or the optional
//! attempt cap is reached.
//!
//! ## Errors
//!
//! - `DutyLoadError`: retried when recoverable
//! - `DutyExecutionError`: reported per duty, siblings unaffected
//! - `ForkLookupError`: failed fork lookups are not cached

#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

mod metrics;

pub use config::{DutyOrchestratorConfig, RetryPolicy};
pub use domain::{
    is_aggregator, slot_signing_root, AggregateAndProof, CommitteeAssignment, Duty, DutyKind, ForkInfo,
    ScheduledDutySet, SignedAggregateAndProof, ValidatorDuties,
};
pub use error::{ApiError, DutyExecutionError, DutyLoadError, ForkLookupError, SignerError};
pub use ports::{DutySigner, ValidatorApi, ValidatorTimingApi};
pub use service::{
    DutyLoader, DutyOrchestrator, DutyReport, EpochStatus, ForkProvider, RetryingDutyLoader,
    ValidatorApiDutyLoader,
};
