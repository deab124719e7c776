//! # Quantum Chain - Block Production (Subsystem 17)
//!
//! **Bounded Context:** Block Assembly
//! **Architecture Compliance:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! Builds unsigned candidate blocks for a validator that is due to propose:
//! - Fast-forwards the previous state through any skipped slots
//! - Collects attestations, deposits, proposer slashings and the
//!   external-data vote from their sources
//! - Hands the operations to the state transition engine, which drops what
//!   would not apply, truncates to protocol maximums and seals the state root
//!
//! ## Critical Invariants
//!
//! 1. **Applicability**: the block applies to `advance(previous_state, slot)`
//! 2. **Maximums**: no operation list exceeds its protocol limit
//! 3. **Read-only sources**: pools are queried, never mutated, by assembly
//! 4. **No new error kinds**: failures are the engine's slot, epoch or block
//!    errors, unchanged
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters: in-memory attestation/slashing pools     │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports                                              │
//! │  - Inbound: BlockAssemblyApi                        │
//! │  - Outbound: AttestationPool, DepositProvider,      │
//! │              ExternalDataCache, SlashingPool        │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Service: BlockAssembler (over qc-04 engine)        │
//! └─────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod ports;
pub mod service;

mod config;
mod error;
mod metrics;

pub use config::BlockProductionConfig;
pub use error::{Result, StateTransitionError};
pub use metrics::Metrics;

pub use adapters::{CurrentExternalData, InMemoryAttestationPool, InMemorySlashingPool};
pub use ports::{
    AttestationPool, BlockAssemblyApi, DepositProvider, ExternalDataCache, SlashingPool,
};
pub use service::BlockAssembler;
