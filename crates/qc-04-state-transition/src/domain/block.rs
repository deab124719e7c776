//! # Block Processing
//!
//! Applies a block body to a state already advanced to the block's slot.
//!
//! Order: header, randao, external-data vote, proposer slashings,
//! attestations, deposits. Signature validity is checked outside this crate.

use super::committees::{compute_committees, compute_proposer_index};
use super::activation_exit_epoch;
use super::slot::check_shape;
use crate::error::{AttestationError, BlockProcessingError, CommitteeError};
use shared_types::{
    keccak256, Attestation, BlockHeader, CandidateBlock, ChainState, Deposit, ExternalDataRecord,
    HashRoot, PendingAttestation, ProposerSlashing, ProtocolConstants, Validator, ValidatorIndex,
    EMPTY_SIGNATURE, FAR_FUTURE_EPOCH, ZERO_HASH,
};

/// Whistleblower share is `effective_balance / WHISTLEBLOWER_REWARD_QUOTIENT`.
const WHISTLEBLOWER_REWARD_QUOTIENT: u64 = 512;

pub fn process_block(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    block: &CandidateBlock,
) -> Result<(), BlockProcessingError> {
    check_shape(state, constants)?;
    if state.validators.len() != state.balances.len() {
        return Err(BlockProcessingError::BalancesLength {
            slot: state.slot,
            validators: state.validators.len(),
            balances: state.balances.len(),
        });
    }
    process_block_header(state, constants, block)?;
    process_randao(state, constants, block)?;
    process_external_data_vote(state, constants, &block.body.external_data);
    process_operations(state, constants, block)?;
    Ok(())
}

fn process_block_header(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    block: &CandidateBlock,
) -> Result<(), BlockProcessingError> {
    if block.slot != state.slot {
        return Err(BlockProcessingError::SlotMismatch {
            state_slot: state.slot,
            block_slot: block.slot,
        });
    }
    if block.slot <= state.latest_block_header.slot {
        return Err(BlockProcessingError::NotNewerThanLatest {
            block_slot: block.slot,
            latest_slot: state.latest_block_header.slot,
        });
    }

    let expected = compute_proposer_index(state, constants, block.slot)?;
    if block.proposer_index != expected {
        return Err(BlockProcessingError::ProposerMismatch {
            expected,
            actual: block.proposer_index,
        });
    }

    let parent_root = state.latest_block_header.hash_root();
    if block.parent_root != parent_root {
        return Err(BlockProcessingError::ParentRootMismatch {
            expected: parent_root,
            actual: block.parent_root,
        });
    }

    let proposer = state
        .validators
        .get(block.proposer_index as usize)
        .ok_or(BlockProcessingError::UnknownValidator {
            index: block.proposer_index,
        })?;
    if proposer.slashed {
        return Err(BlockProcessingError::ProposerSlashed {
            index: block.proposer_index,
        });
    }

    // State root is filled in by the next slot's processing.
    state.latest_block_header = BlockHeader {
        slot: block.slot,
        proposer_index: block.proposer_index,
        parent_root: block.parent_root,
        state_root: ZERO_HASH,
        body_root: block.body.hash_root(),
    };
    Ok(())
}

fn process_randao(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    block: &CandidateBlock,
) -> Result<(), BlockProcessingError> {
    if block.body.randao_reveal == EMPTY_SIGNATURE {
        return Err(BlockProcessingError::EmptyRandaoReveal);
    }
    let position = (state.slot % constants.randao_mixes_length) as usize;
    let reveal = keccak256(&block.body.randao_reveal);
    let mix = state
        .randao_mixes
        .get_mut(position)
        .ok_or(CommitteeError::MissingRandaoMix { slot: state.slot })?;
    for (byte, r) in mix.iter_mut().zip(reveal) {
        *byte ^= r;
    }
    Ok(())
}

/// External-data record the state adopts after counting `vote`.
pub fn external_data_after_vote(
    state: &ChainState,
    constants: &ProtocolConstants,
    vote: &ExternalDataRecord,
) -> ExternalDataRecord {
    let count = state
        .external_data_votes
        .iter()
        .filter(|v| *v == vote)
        .count() as u64
        + 1;
    if count * 2 > constants.slots_per_voting_period() {
        *vote
    } else {
        state.external_data
    }
}

fn process_external_data_vote(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    vote: &ExternalDataRecord,
) {
    state.external_data = external_data_after_vote(state, constants, vote);
    state.external_data_votes.push(*vote);
}

fn process_operations(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    block: &CandidateBlock,
) -> Result<(), BlockProcessingError> {
    let body = &block.body;
    check_max("proposer slashings", body.proposer_slashings.len(), constants.max_proposer_slashings)?;
    check_max("attestations", body.attestations.len(), constants.max_attestations)?;
    check_max("deposits", body.deposits.len(), constants.max_deposits)?;

    let expected = expected_deposit_count(state, constants);
    if body.deposits.len() as u64 != expected {
        return Err(BlockProcessingError::DepositCountMismatch {
            expected,
            actual: body.deposits.len() as u64,
        });
    }

    for slashing in &body.proposer_slashings {
        process_proposer_slashing(state, constants, slashing, block.proposer_index)?;
    }
    for attestation in &body.attestations {
        process_attestation(state, constants, attestation, block.proposer_index)?;
    }
    for deposit in &body.deposits {
        process_deposit(state, constants, deposit)?;
    }
    Ok(())
}

fn check_max(kind: &'static str, count: usize, max: usize) -> Result<(), BlockProcessingError> {
    if count > max {
        return Err(BlockProcessingError::TooManyOperations { kind, count, max });
    }
    Ok(())
}

/// Deposits a block must carry given the state's external-data record.
pub fn expected_deposit_count(state: &ChainState, constants: &ProtocolConstants) -> u64 {
    state
        .external_data
        .deposit_count
        .saturating_sub(state.deposit_index)
        .min(constants.max_deposits as u64)
}

/// Check a proposer slashing against `state` without applying it.
pub fn validate_proposer_slashing(
    state: &ChainState,
    constants: &ProtocolConstants,
    slashing: &ProposerSlashing,
) -> Result<ValidatorIndex, BlockProcessingError> {
    let h1 = &slashing.signed_header_1.message;
    let h2 = &slashing.signed_header_2.message;
    if h1.slot != h2.slot {
        return Err(BlockProcessingError::InvalidProposerSlashing {
            reason: "headers are for different slots",
        });
    }
    if h1.proposer_index != h2.proposer_index {
        return Err(BlockProcessingError::InvalidProposerSlashing {
            reason: "headers have different proposers",
        });
    }
    if h1 == h2 {
        return Err(BlockProcessingError::InvalidProposerSlashing {
            reason: "headers are identical",
        });
    }
    let validator = state
        .validators
        .get(h1.proposer_index as usize)
        .ok_or(BlockProcessingError::UnknownValidator {
            index: h1.proposer_index,
        })?;
    if !validator.is_slashable_at(state.current_epoch(constants)) {
        return Err(BlockProcessingError::InvalidProposerSlashing {
            reason: "proposer is not slashable",
        });
    }
    Ok(h1.proposer_index)
}

fn process_proposer_slashing(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    slashing: &ProposerSlashing,
    whistleblower: ValidatorIndex,
) -> Result<(), BlockProcessingError> {
    let index = validate_proposer_slashing(state, constants, slashing)? as usize;
    let epoch = state.current_epoch(constants);

    let validator = state
        .validators
        .get_mut(index)
        .ok_or(BlockProcessingError::UnknownValidator {
            index: index as ValidatorIndex,
        })?;
    validator.slashed = true;
    if validator.exit_epoch == FAR_FUTURE_EPOCH {
        validator.exit_epoch = activation_exit_epoch(epoch);
    }
    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .min(epoch + constants.min_validator_withdrawability_delay)
        .max(validator.exit_epoch);
    let effective = validator.effective_balance;

    let balance = state
        .balances
        .get_mut(index)
        .ok_or(BlockProcessingError::UnknownValidator {
            index: index as ValidatorIndex,
        })?;
    *balance = balance.saturating_sub(effective / constants.min_slashing_penalty_quotient);
    if let Some(balance) = state.balances.get_mut(whistleblower as usize) {
        *balance = balance.saturating_add(effective / WHISTLEBLOWER_REWARD_QUOTIENT);
    }
    Ok(())
}

/// Check an attestation against `state` without applying it.
pub fn validate_attestation(
    state: &ChainState,
    constants: &ProtocolConstants,
    attestation: &Attestation,
) -> Result<(), AttestationError> {
    let data = &attestation.data;
    let current = state.current_epoch(constants);
    let previous = current.saturating_sub(1);

    if data.target.epoch != current && data.target.epoch != previous {
        return Err(AttestationError::TargetEpochOutOfRange {
            target: data.target.epoch,
            current,
        });
    }
    if data.target.epoch != constants.epoch_at_slot(data.slot) {
        return Err(AttestationError::TargetEpochMismatch {
            target: data.target.epoch,
            slot: data.slot,
        });
    }
    if data.slot + constants.min_attestation_inclusion_delay > state.slot {
        return Err(AttestationError::InclusionTooEarly {
            attestation_slot: data.slot,
            state_slot: state.slot,
        });
    }
    if state.slot > data.slot + constants.slots_per_epoch {
        return Err(AttestationError::InclusionTooLate {
            attestation_slot: data.slot,
            state_slot: state.slot,
        });
    }

    let committees = compute_committees(state, constants, data.target.epoch)?;
    if data.index >= committees.committees_per_slot {
        return Err(AttestationError::CommitteeIndexOutOfRange {
            index: data.index,
            committees: committees.committees_per_slot,
        });
    }
    let committee = committees.committee(data.slot, data.index).unwrap_or(&[]);
    if attestation.aggregation_bits.len() != committee.len() {
        return Err(AttestationError::AggregationBitsLength {
            expected: committee.len(),
            actual: attestation.aggregation_bits.len(),
        });
    }
    if attestation.participant_count() == 0 {
        return Err(AttestationError::NoParticipants);
    }

    let justified = if data.target.epoch == current {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != justified {
        return Err(AttestationError::SourceMismatch);
    }
    Ok(())
}

fn process_attestation(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    attestation: &Attestation,
    proposer_index: ValidatorIndex,
) -> Result<(), BlockProcessingError> {
    validate_attestation(state, constants, attestation)?;
    let pending = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: attestation.data,
        inclusion_delay: state.slot - attestation.data.slot,
        proposer_index,
    };
    if attestation.data.target.epoch == state.current_epoch(constants) {
        state.current_epoch_attestations.push(pending);
    } else {
        state.previous_epoch_attestations.push(pending);
    }
    Ok(())
}

fn process_deposit(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    deposit: &Deposit,
) -> Result<(), BlockProcessingError> {
    if deposit.index != state.deposit_index {
        return Err(BlockProcessingError::DepositIndexMismatch {
            expected: state.deposit_index,
            actual: deposit.index,
        });
    }
    state.deposit_index += 1;

    let data = &deposit.data;
    match state.validator_index(&data.pubkey) {
        Some(index) => {
            let balance = state
                .balances
                .get_mut(index as usize)
                .ok_or(BlockProcessingError::UnknownValidator { index })?;
            *balance = balance.saturating_add(data.amount);
        }
        None => {
            let effective_balance = (data.amount - data.amount % constants.effective_balance_increment)
                .min(constants.max_effective_balance);
            let activation_epoch = if effective_balance == constants.max_effective_balance {
                activation_exit_epoch(state.current_epoch(constants))
            } else {
                FAR_FUTURE_EPOCH
            };
            state.validators.push(Validator {
                pubkey: data.pubkey,
                withdrawal_credentials: data.withdrawal_credentials,
                effective_balance,
                slashed: false,
                activation_epoch,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
            });
            state.balances.push(data.amount);
        }
    }
    Ok(())
}
