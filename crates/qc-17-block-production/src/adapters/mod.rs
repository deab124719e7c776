//! Adapters for operation sources

pub mod memory;

pub use memory::{CurrentExternalData, InMemoryAttestationPool, InMemorySlashingPool};
