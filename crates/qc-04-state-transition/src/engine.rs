//! # State Transition Engine
//!
//! Pure transition functions over immutable `ChainState` snapshots. Every
//! operation clones its input and returns a new state; the caller decides
//! whether to keep or discard the old one.

use crate::domain::block::{
    external_data_after_vote, process_block, validate_attestation,
    validate_proposer_slashing,
};
use crate::domain::epoch::process_epoch;
use crate::domain::slot::process_slot;
use crate::domain::{compute_committees, compute_proposer_index, EpochCommittees};
use crate::error::{BlockProcessingError, Result, SlotProcessingError};
use crate::metrics;
use shared_types::{
    Attestation, BlockBody, BlockHeader, CandidateBlock, ChainState, ConfigError, Deposit, Epoch,
    ExternalDataRecord, Hash, HashRoot, ProposerSlashing, ProtocolConstants, Slot, ValidatorIndex,
    BlsSignature, ZERO_HASH,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Operations offered for packing into a new block.
#[derive(Clone, Debug)]
pub struct BlockContents {
    pub randao_reveal: BlsSignature,
    pub external_data: ExternalDataRecord,
    pub graffiti: Hash,
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
}

/// Deterministic slot, epoch and block processing.
#[derive(Clone, Debug)]
pub struct StateTransitionEngine {
    constants: ProtocolConstants,
}

impl StateTransitionEngine {
    /// Create an engine for validated protocol constants.
    pub fn new(constants: ProtocolConstants) -> std::result::Result<Self, ConfigError> {
        constants.validate()?;
        Ok(Self { constants })
    }

    pub fn constants(&self) -> &ProtocolConstants {
        &self.constants
    }

    /// Advance `state` through empty slots up to `target_slot`.
    ///
    /// Epoch processing runs at every epoch boundary crossed, after the slot
    /// processing that enters the boundary slot. `advance(s, s.slot)` returns
    /// an identical state.
    pub fn advance(&self, state: &ChainState, target_slot: Slot) -> Result<ChainState> {
        if target_slot < state.slot {
            return Err(SlotProcessingError::TargetInPast {
                current: state.slot,
                target: target_slot,
            }
            .into());
        }

        let mut next = state.clone();
        while next.slot < target_slot {
            process_slot(&mut next, &self.constants)?;
            if self.constants.is_epoch_start(next.slot) {
                let epoch = next.current_epoch(&self.constants);
                let summary = process_epoch(&mut next, &self.constants)?;
                metrics::record_epoch_processed();
                if let Some(checkpoint) = summary.finalized {
                    info!(
                        epoch,
                        finalized_epoch = checkpoint.epoch,
                        "[qc-04] Checkpoint finalized"
                    );
                } else if let Some(checkpoint) = summary.justified {
                    debug!(epoch, justified_epoch = checkpoint.epoch, "[qc-04] Checkpoint justified");
                }
            }
        }
        if target_slot > state.slot {
            metrics::record_slots_processed(target_slot - state.slot);
        }
        Ok(next)
    }

    /// Apply `block` to a state already advanced to `block.slot`.
    ///
    /// The block's `state_root` must equal the root of the resulting state.
    pub fn apply_block(&self, state: &ChainState, block: &CandidateBlock) -> Result<ChainState> {
        let next = self.process(state, block).inspect_err(|err| {
            metrics::record_block_rejected(err.kind());
        })?;
        let root = next.hash_root();
        if block.state_root != root {
            metrics::record_block_rejected("block");
            return Err(BlockProcessingError::StateRootMismatch {
                expected: root,
                actual: block.state_root,
            }
            .into());
        }
        metrics::record_block_applied();
        debug!(slot = block.slot, proposer = block.proposer_index, "[qc-04] Block applied");
        Ok(next)
    }

    /// Advance to `block.slot` and apply `block`.
    pub fn import_block(&self, state: &ChainState, block: &CandidateBlock) -> Result<ChainState> {
        let advanced = self.advance(state, block.slot)?;
        self.apply_block(&advanced, block)
    }

    fn process(&self, state: &ChainState, block: &CandidateBlock) -> Result<ChainState> {
        let mut next = state.clone();
        process_block(&mut next, &self.constants, block)?;
        Ok(next)
    }

    /// Pack `contents` into a block for `state.slot` and fill its state root.
    ///
    /// `state` must already be advanced to the target slot. Attestations and
    /// slashings that would not apply are dropped, every list is truncated to
    /// its protocol maximum and deposits are limited to the count the block
    /// must carry.
    pub fn create_block(
        &self,
        state: &ChainState,
        proposer_index: ValidatorIndex,
        parent_root: Hash,
        contents: BlockContents,
    ) -> Result<CandidateBlock> {
        let c = &self.constants;

        let mut seen = HashSet::new();
        let proposer_slashings: Vec<_> = contents
            .proposer_slashings
            .into_iter()
            .filter(|s| match validate_proposer_slashing(state, c, s) {
                Ok(index) => seen.insert(index),
                Err(_) => false,
            })
            .take(c.max_proposer_slashings)
            .collect();

        let offered = contents.attestations.len();
        let attestations: Vec<_> = contents
            .attestations
            .into_iter()
            .filter(|a| validate_attestation(state, c, a).is_ok())
            .take(c.max_attestations)
            .collect();
        if attestations.len() < offered.min(c.max_attestations) {
            warn!(
                slot = state.slot,
                offered,
                included = attestations.len(),
                "[qc-04] Dropped attestations that do not apply to the block state"
            );
        }

        let voted = external_data_after_vote(state, c, &contents.external_data);
        let expected_deposits = voted
            .deposit_count
            .saturating_sub(state.deposit_index)
            .min(c.max_deposits as u64) as usize;
        let deposits: Vec<_> = contents
            .deposits
            .into_iter()
            .skip_while(|d| d.index < state.deposit_index)
            .take(expected_deposits)
            .collect();

        let mut block = CandidateBlock {
            slot: state.slot,
            proposer_index,
            parent_root,
            state_root: ZERO_HASH,
            body: BlockBody {
                randao_reveal: contents.randao_reveal,
                external_data: contents.external_data,
                graffiti: contents.graffiti,
                proposer_slashings,
                attestations,
                deposits,
            },
        };
        let post = self.process(state, &block)?;
        block.state_root = post.hash_root();
        Ok(block)
    }

    /// Proposer for `slot`, from a state within one epoch of it.
    pub fn proposer_index(&self, state: &ChainState, slot: Slot) -> Result<ValidatorIndex> {
        Ok(compute_proposer_index(state, &self.constants, slot)?)
    }

    /// Committees of `epoch`, from a state within the committee window.
    pub fn committees(&self, state: &ChainState, epoch: Epoch) -> Result<EpochCommittees> {
        Ok(compute_committees(state, &self.constants, epoch)?)
    }

    /// Whether `attestation` could be included in a block at `state.slot`.
    pub fn is_valid_attestation(&self, state: &ChainState, attestation: &Attestation) -> bool {
        validate_attestation(state, &self.constants, attestation).is_ok()
    }

    /// Root of the block heading the chain at `slot`.
    ///
    /// For `slot == state.slot` this is the latest header with its state root
    /// filled in, the value a child block must use as parent root.
    pub fn block_root_at(&self, state: &ChainState, slot: Slot) -> Option<Hash> {
        if slot == state.slot {
            let mut header: BlockHeader = state.latest_block_header;
            if header.state_root == ZERO_HASH {
                header.state_root = state.hash_root();
            }
            return Some(header.hash_root());
        }
        crate::domain::block_root_at_slot(state, &self.constants, slot)
    }
}
