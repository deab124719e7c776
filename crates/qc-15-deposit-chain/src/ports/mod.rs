//! # Ports
//!
//! Inbound API offered to block production and the deposit-chain endpoint
//! this crate depends on.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
