//! Block Assembler
//!
//! Builds unsigned candidate blocks. The previous state is advanced to the
//! target slot, operation sources are queried against the advanced state and
//! the engine packs and seals the block, so the result always applies to
//! `advance(previous_state, slot)`.

use crate::{
    config::BlockProductionConfig,
    error::Result,
    metrics::Metrics,
    ports::{AttestationPool, BlockAssemblyApi, DepositProvider, ExternalDataCache, SlashingPool},
};
use async_trait::async_trait;
use qc_04_state_transition::{BlockContents, StateTransitionEngine};
use shared_types::{BlsSignature, CandidateBlock, ChainState, Slot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Unsigned block factory.
pub struct BlockAssembler {
    engine: Arc<StateTransitionEngine>,
    attestation_pool: Arc<dyn AttestationPool>,
    deposit_provider: Arc<dyn DepositProvider>,
    external_data: Arc<dyn ExternalDataCache>,
    slashing_pool: Arc<dyn SlashingPool>,
    config: BlockProductionConfig,
    metrics: Metrics,
}

impl BlockAssembler {
    pub fn new(
        engine: Arc<StateTransitionEngine>,
        attestation_pool: Arc<dyn AttestationPool>,
        deposit_provider: Arc<dyn DepositProvider>,
        external_data: Arc<dyn ExternalDataCache>,
        slashing_pool: Arc<dyn SlashingPool>,
        config: BlockProductionConfig,
    ) -> Self {
        info!(
            graffiti = %config.graffiti,
            "[qc-17] Initializing Block Assembler"
        );
        Self {
            engine,
            attestation_pool,
            deposit_provider,
            external_data,
            slashing_pool,
            config,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn assemble(
        &self,
        previous_state: &ChainState,
        previous_block: &CandidateBlock,
        slot: Slot,
        randao_reveal: BlsSignature,
    ) -> Result<CandidateBlock> {
        let state = self.engine.advance(previous_state, slot)?;

        let (attestations, deposits, external_data, proposer_slashings) = tokio::join!(
            self.attestation_pool.attestations_for(slot),
            self.deposit_provider.deposits_for(&state),
            self.external_data.vote_for(&state),
            self.slashing_pool.proposer_slashings(),
        );
        debug!(
            slot,
            offered_attestations = attestations.len(),
            offered_deposits = deposits.len(),
            offered_slashings = proposer_slashings.len(),
            "[qc-17] Operations collected"
        );

        let parent_root = previous_block.root();
        let proposer_index = self.engine.proposer_index(&state, slot)?;

        self.engine.create_block(
            &state,
            proposer_index,
            parent_root,
            BlockContents {
                randao_reveal,
                external_data,
                graffiti: self.config.graffiti_bytes(),
                proposer_slashings,
                attestations,
                deposits,
            },
        )
    }
}

#[async_trait]
impl BlockAssemblyApi for BlockAssembler {
    async fn create_unsigned_block(
        &self,
        previous_state: &ChainState,
        previous_block: &CandidateBlock,
        slot: Slot,
        randao_reveal: BlsSignature,
    ) -> Result<CandidateBlock> {
        match self
            .assemble(previous_state, previous_block, slot, randao_reveal)
            .await
        {
            Ok(block) => {
                self.metrics.record_block_assembled(
                    block.body.attestations.len(),
                    block.body.deposits.len(),
                    block.body.proposer_slashings.len(),
                    slot.saturating_sub(previous_state.slot).saturating_sub(1),
                );
                info!(
                    slot,
                    proposer = block.proposer_index,
                    attestations = block.body.attestations.len(),
                    deposits = block.body.deposits.len(),
                    root = %hex::encode(block.root()),
                    "[qc-17] Unsigned block assembled"
                );
                Ok(block)
            }
            Err(e) => {
                self.metrics.record_assembly_failure();
                warn!(slot, kind = e.kind(), error = %e, "[qc-17] Block assembly failed");
                Err(e)
            }
        }
    }
}
