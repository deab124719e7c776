//! # Node Runtime
//!
//! Wires the consensus subsystems into a running development node.
//!
//! ## Components
//!
//! | Module     | Role                                                    |
//! |------------|---------------------------------------------------------|
//! | `config`   | `NodeConfig`: every subsystem section, env overrides    |
//! | `genesis`  | Deterministic development validator set and genesis     |
//! | `clock`    | `SlotClock`: publishes slot and epoch starts on the bus |
//! | `api`      | `BeaconNodeApi`: head tracking, the validator-facing API|
//! | `adapters` | Port implementations bridging the subsystems            |
//! | `wiring`   | Bus handlers feeding the timeline into each subsystem   |
//! | `node`     | `NodeRuntime`: construction, start and shutdown         |
//!
//! ## Flow
//!
//! ```text
//! SlotClock ──▶ bus ──▶ DutyOrchestrator (qc-18) ──▶ BeaconNodeApi
//!                  │                                    │
//!                  ├──▶ subnet expiry (qc-05)           ├──▶ BlockAssembler (qc-17)
//!                  └──▶ deposit chain sync (qc-15)      └──▶ StateTransitionEngine (qc-04)
//! ```

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod api;
pub mod clock;
pub mod config;
pub mod genesis;
pub mod node;
pub mod wiring;

pub use api::{BeaconNodeApi, ChainHead};
pub use clock::SlotClock;
pub use config::NodeConfig;
pub use genesis::{dev_pubkey, Genesis, GenesisBuilder, GenesisError};
pub use node::{NodeError, NodeRuntime};
