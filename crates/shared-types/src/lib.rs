//! # Shared Types Crate
//!
//! This crate contains the beacon-chain data model shared by every subsystem,
//! the protocol constants, canonical hashing, and the bounded admission
//! primitive used wherever concurrent work must be capped.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Immutable Snapshots**: `ChainState` and blocks are plain values. New
//!   states are produced by the state-transition subsystem, never edited in
//!   place by their consumers.
//! - **Deterministic Roots**: Every entity has a canonical `hash_root`.

pub mod entities;
pub mod errors;
pub mod hashing;
pub mod protocol;
pub mod throttle;

pub use entities::*;
pub use errors::*;
pub use hashing::{keccak256, HashRoot, RootHasher};
pub use protocol::ProtocolConstants;
pub use throttle::{GateError, GateHandle, ThrottlingRequestGate};
