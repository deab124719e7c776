//! # QC-15 Deposit Chain
//!
//! Access to the external chain that carries validator deposits.
//!
//! **Subsystem ID:** 15
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! - Bound concurrent requests to the deposit-chain endpoint
//!   (`ThrottlingDepositChainProvider`). Block-by-number, block-by-hash,
//!   latest block and contract calls all share one admission queue.
//! - Follow the deposit chain at a safe distance and answer external-data
//!   votes for block production (`ExternalDataTracker`).
//! - Keep the deposit log that block production draws deposits from.
//!
//! ## Module Structure
//!
//! ```text
//! qc-15-deposit-chain/
//! ├── domain/     # DepositChainBlock, contract ABI, DepositLog
//! ├── ports/      # DepositChainProvider, ExternalDataVoteApi
//! ├── adapters/   # Throttling wrapper, in-memory chain
//! └── service.rs  # ExternalDataTracker
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
mod metrics;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryDepositChain, ThrottlingDepositChainProvider};
pub use config::DepositChainConfig;
pub use domain::{Address, CallRequest, DepositChainBlock, DepositContractCall, DepositLog};
pub use error::{ExternalRequestError, Result};
pub use ports::{DepositChainProvider, ExternalDataVoteApi};
pub use service::{ExternalDataTracker, TrackedBlock};
