//! Adapters for the deposit-chain endpoint.

pub mod memory;
pub mod throttling;

pub use memory::InMemoryDepositChain;
pub use throttling::ThrottlingDepositChainProvider;
