//! Inbound ports (driving side - API)

use crate::error::Result;
use async_trait::async_trait;
use shared_types::{BlsSignature, CandidateBlock, ChainState, Slot};

/// Primary port: block assembly
#[async_trait]
pub trait BlockAssemblyApi: Send + Sync {
    /// Build an unsigned block for `slot` on top of `previous_block`.
    ///
    /// `previous_state` is the post-state of `previous_block`; it is advanced
    /// to `slot` internally. The returned block applies cleanly to that
    /// advanced state.
    async fn create_unsigned_block(
        &self,
        previous_state: &ChainState,
        previous_block: &CandidateBlock,
        slot: Slot,
        randao_reveal: BlsSignature,
    ) -> Result<CandidateBlock>;
}
