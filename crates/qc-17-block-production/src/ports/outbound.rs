//! Outbound ports (driven side - SPI)
//!
//! Sources of block operations. Assembly only reads from them; marking
//! operations as consumed is the source's concern once a block is imported.

use async_trait::async_trait;
use shared_types::{Attestation, ChainState, Deposit, ExternalDataRecord, ProposerSlashing, Slot};

/// Port: aggregated attestations eligible for a block
#[async_trait]
pub trait AttestationPool: Send + Sync {
    /// Best attestations for a block at `slot`, best first.
    async fn attestations_for(&self, slot: Slot) -> Vec<Attestation>;
}

/// Port: deposits not yet processed by the chain
#[async_trait]
pub trait DepositProvider: Send + Sync {
    /// Deposits following `state.deposit_index`, in index order.
    async fn deposits_for(&self, state: &ChainState) -> Vec<Deposit>;
}

/// Port: external-data vote
#[async_trait]
pub trait ExternalDataCache: Send + Sync {
    /// Record a proposer on `state` should vote for.
    async fn vote_for(&self, state: &ChainState) -> ExternalDataRecord;
}

/// Port: proposer slashings awaiting inclusion
#[async_trait]
pub trait SlashingPool: Send + Sync {
    async fn proposer_slashings(&self) -> Vec<ProposerSlashing>;
}
