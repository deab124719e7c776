//! # Outbound Ports
//!
//! The deposit-chain endpoint.

use crate::domain::{CallRequest, DepositChainBlock};
use crate::error::Result;
use async_trait::async_trait;
use shared_types::Hash;

/// Deposit-chain JSON-RPC endpoint - outbound port.
///
/// Every method is a single request; the throttled adapter counts each call
/// against its concurrency limit.
#[async_trait]
pub trait DepositChainProvider: Send + Sync {
    /// Block at `number` on the canonical chain.
    async fn block_by_number(&self, number: u64) -> Result<DepositChainBlock>;

    /// Block with `hash`.
    async fn block_by_hash(&self, hash: Hash) -> Result<DepositChainBlock>;

    /// Current head.
    async fn latest_block(&self) -> Result<DepositChainBlock>;

    /// Read-only contract call.
    async fn call(&self, request: CallRequest) -> Result<Vec<u8>>;
}
