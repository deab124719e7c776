//! # Epoch Processing
//!
//! Runs once at every epoch boundary, after the slot counter has moved to the
//! first slot of the new epoch. The epoch being closed is `ended`.
//!
//! Order:
//! 1. Casper FFG justification and finalization
//! 2. Rewards and penalties for the epoch before `ended`
//! 3. Registry activations
//! 4. Effective balance updates
//! 5. Pending attestation rotation
//! 6. External-data vote reset at voting-period boundaries

use super::committees::{compute_committees, EpochCommittees};
use super::{activation_exit_epoch, block_root_at_slot, integer_sqrt};
use crate::error::EpochProcessingError;
use shared_types::{
    ChainState, Checkpoint, Epoch, Gwei, Hash, PendingAttestation, ProtocolConstants,
    ValidatorIndex, FAR_FUTURE_EPOCH,
};
use std::collections::{BTreeMap, BTreeSet};

/// Reward components per epoch (source, target, head, inclusion).
const BASE_REWARDS_PER_EPOCH: u64 = 4;

/// Proposer share of the inclusion reward is `base_reward / PROPOSER_REWARD_QUOTIENT`.
const PROPOSER_REWARD_QUOTIENT: u64 = 8;

/// Epochs without finality before the inactivity leak starts.
const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;

/// Summary of one boundary, used for logging.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochSummary {
    pub justified: Option<Checkpoint>,
    pub finalized: Option<Checkpoint>,
}

pub fn process_epoch(
    state: &mut ChainState,
    constants: &ProtocolConstants,
) -> Result<EpochSummary, EpochProcessingError> {
    let new_epoch = state.current_epoch(constants);
    if state.validators.len() != state.balances.len() {
        return Err(EpochProcessingError::MalformedState {
            epoch: new_epoch,
            reason: format!(
                "{} validators but {} balances",
                state.validators.len(),
                state.balances.len()
            ),
        });
    }
    let ended = new_epoch.saturating_sub(1);
    let mut cache = CommitteeCache::default();

    let summary = process_justification_and_finalization(state, constants, ended, &mut cache)?;
    process_rewards_and_penalties(state, constants, ended, &mut cache)?;
    process_registry_updates(state, constants, new_epoch);
    process_effective_balance_updates(state, constants);

    state.previous_epoch_attestations = std::mem::take(&mut state.current_epoch_attestations);
    if new_epoch % constants.epochs_per_eth1_voting_period == 0 {
        state.external_data_votes.clear();
    }
    Ok(summary)
}

/// Committees computed at most once per epoch during one boundary.
#[derive(Default)]
struct CommitteeCache {
    by_epoch: BTreeMap<Epoch, EpochCommittees>,
}

impl CommitteeCache {
    fn get(
        &mut self,
        state: &ChainState,
        constants: &ProtocolConstants,
        epoch: Epoch,
    ) -> Result<&EpochCommittees, EpochProcessingError> {
        if !self.by_epoch.contains_key(&epoch) {
            let committees = compute_committees(state, constants, epoch)?;
            self.by_epoch.insert(epoch, committees);
        }
        self.by_epoch
            .get(&epoch)
            .ok_or(EpochProcessingError::MalformedState {
                epoch,
                reason: "committee cache miss".to_string(),
            })
    }
}

/// Validators set in the aggregation bits of `attestation`.
fn attesting_indices(
    state: &ChainState,
    constants: &ProtocolConstants,
    cache: &mut CommitteeCache,
    attestation: &PendingAttestation,
) -> Result<Vec<ValidatorIndex>, EpochProcessingError> {
    let data = &attestation.data;
    let committees = cache.get(state, constants, data.target.epoch)?;
    let committee = committees.committee(data.slot, data.index).ok_or_else(|| {
        EpochProcessingError::MalformedState {
            epoch: data.target.epoch,
            reason: format!("no committee {} at slot {}", data.index, data.slot),
        }
    })?;
    Ok(committee
        .iter()
        .zip(&attestation.aggregation_bits)
        .filter(|(_, bit)| **bit)
        .map(|(index, _)| *index)
        .collect())
}

/// Unslashed validators attesting through any of `attestations`.
fn unslashed_attesters<'a>(
    state: &ChainState,
    constants: &ProtocolConstants,
    cache: &mut CommitteeCache,
    attestations: impl Iterator<Item = &'a PendingAttestation>,
) -> Result<BTreeSet<ValidatorIndex>, EpochProcessingError> {
    let mut set = BTreeSet::new();
    for attestation in attestations {
        set.extend(attesting_indices(state, constants, cache, attestation)?);
    }
    set.retain(|index| {
        state
            .validators
            .get(*index as usize)
            .is_some_and(|v| !v.slashed)
    });
    Ok(set)
}

fn balance_of(state: &ChainState, constants: &ProtocolConstants, set: &BTreeSet<ValidatorIndex>) -> Gwei {
    let sum = set
        .iter()
        .filter_map(|i| state.validators.get(*i as usize))
        .fold(0u64, |acc, v| acc.saturating_add(v.effective_balance));
    sum.max(constants.effective_balance_increment)
}

fn epoch_boundary_root(
    state: &ChainState,
    constants: &ProtocolConstants,
    epoch: Epoch,
) -> Result<Hash, EpochProcessingError> {
    let slot = constants.epoch_start_slot(epoch);
    block_root_at_slot(state, constants, slot)
        .ok_or(EpochProcessingError::BlockRootUnavailable { slot })
}

fn process_justification_and_finalization(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    ended: Epoch,
    cache: &mut CommitteeCache,
) -> Result<EpochSummary, EpochProcessingError> {
    let mut summary = EpochSummary::default();
    if ended <= 1 {
        return Ok(summary);
    }
    let previous = ended - 1;
    let total = state.total_active_balance(ended).max(constants.effective_balance_increment) as u128;

    let old_previous_justified = state.previous_justified_checkpoint;
    let old_current_justified = state.current_justified_checkpoint;

    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    let bits = state.justification_bits;
    state.justification_bits = [false, bits[0], bits[1], bits[2]];

    let previous_root = epoch_boundary_root(state, constants, previous)?;
    let previous_attesters = unslashed_attesters(
        state,
        constants,
        cache,
        state
            .previous_epoch_attestations
            .iter()
            .filter(|a| a.data.target.root == previous_root),
    )?;
    if balance_of(state, constants, &previous_attesters) as u128 * 3 >= total * 2 {
        state.current_justified_checkpoint = Checkpoint::new(previous, previous_root);
        state.justification_bits[1] = true;
        summary.justified = Some(state.current_justified_checkpoint);
    }

    let current_root = epoch_boundary_root(state, constants, ended)?;
    let current_attesters = unslashed_attesters(
        state,
        constants,
        cache,
        state
            .current_epoch_attestations
            .iter()
            .filter(|a| a.data.target.root == current_root),
    )?;
    if balance_of(state, constants, &current_attesters) as u128 * 3 >= total * 2 {
        state.current_justified_checkpoint = Checkpoint::new(ended, current_root);
        state.justification_bits[0] = true;
        summary.justified = Some(state.current_justified_checkpoint);
    }

    let bits = state.justification_bits;
    let finalized = if bits[1..4].iter().all(|b| *b) && old_previous_justified.epoch + 3 == ended {
        Some(old_previous_justified)
    } else if bits[1..3].iter().all(|b| *b) && old_previous_justified.epoch + 2 == ended {
        Some(old_previous_justified)
    } else if bits[0..3].iter().all(|b| *b) && old_current_justified.epoch + 2 == ended {
        Some(old_current_justified)
    } else if bits[0..2].iter().all(|b| *b) && old_current_justified.epoch + 1 == ended {
        Some(old_current_justified)
    } else {
        None
    };
    if let Some(checkpoint) = finalized {
        state.finalized_checkpoint = checkpoint;
        summary.finalized = Some(checkpoint);
    }
    Ok(summary)
}

fn process_rewards_and_penalties(
    state: &mut ChainState,
    constants: &ProtocolConstants,
    ended: Epoch,
    cache: &mut CommitteeCache,
) -> Result<(), EpochProcessingError> {
    if ended == 0 {
        return Ok(());
    }
    let previous = ended - 1;
    let total = state.total_active_balance(ended).max(constants.effective_balance_increment);
    let sqrt_total = integer_sqrt(total).max(1);
    let increment = constants.effective_balance_increment;
    let finality_delay = previous.saturating_sub(state.finalized_checkpoint.epoch);
    let in_leak = finality_delay > MIN_EPOCHS_TO_INACTIVITY_PENALTY;

    let base_reward = |index: usize, state: &ChainState| -> Gwei {
        state.validators[index].effective_balance * constants.base_reward_factor
            / sqrt_total
            / BASE_REWARDS_PER_EPOCH
    };

    let eligible: Vec<usize> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, v)| {
            v.is_active_at(previous) || (v.slashed && previous + 1 < v.withdrawable_epoch)
        })
        .map(|(i, _)| i)
        .collect();

    let target_root = epoch_boundary_root(state, constants, previous)?;
    let attestations = state.previous_epoch_attestations.clone();

    let source_set = unslashed_attesters(state, constants, cache, attestations.iter())?;
    let target_set = unslashed_attesters(
        state,
        constants,
        cache,
        attestations.iter().filter(|a| a.data.target.root == target_root),
    )?;
    let mut head_matching = Vec::new();
    for attestation in &attestations {
        let root = block_root_at_slot(state, constants, attestation.data.slot).ok_or(
            EpochProcessingError::BlockRootUnavailable {
                slot: attestation.data.slot,
            },
        )?;
        if attestation.data.beacon_block_root == root {
            head_matching.push(attestation);
        }
    }
    let head_set = unslashed_attesters(state, constants, cache, head_matching.into_iter())?;

    let mut rewards = vec![0u64; state.validators.len()];
    let mut penalties = vec![0u64; state.validators.len()];

    for set in [&source_set, &target_set, &head_set] {
        let attesting_increments = (balance_of(state, constants, set) / increment) as u128;
        let total_increments = (total / increment).max(1) as u128;
        for &index in &eligible {
            let base = base_reward(index, state);
            if set.contains(&(index as ValidatorIndex)) {
                if in_leak {
                    rewards[index] += base;
                } else {
                    rewards[index] +=
                        (base as u128 * attesting_increments / total_increments) as u64;
                }
            } else {
                penalties[index] += base;
            }
        }
    }

    // Inclusion delay: earliest inclusion of each source attester.
    let mut earliest: BTreeMap<ValidatorIndex, (u64, ValidatorIndex)> = BTreeMap::new();
    for attestation in &attestations {
        for index in attesting_indices(state, constants, cache, attestation)? {
            if !source_set.contains(&index) {
                continue;
            }
            let entry = earliest
                .entry(index)
                .or_insert((attestation.inclusion_delay, attestation.proposer_index));
            if attestation.inclusion_delay < entry.0 {
                *entry = (attestation.inclusion_delay, attestation.proposer_index);
            }
        }
    }
    for (index, (delay, proposer)) in earliest {
        let base = base_reward(index as usize, state);
        let proposer_reward = base / PROPOSER_REWARD_QUOTIENT;
        if let Some(slot) = rewards.get_mut(proposer as usize) {
            *slot += proposer_reward;
        }
        rewards[index as usize] += (base - proposer_reward) / delay.max(1);
    }

    if in_leak {
        for &index in &eligible {
            let base = base_reward(index, state);
            penalties[index] += BASE_REWARDS_PER_EPOCH * base - base / PROPOSER_REWARD_QUOTIENT;
            if !target_set.contains(&(index as ValidatorIndex)) {
                let effective = state.validators[index].effective_balance as u128;
                penalties[index] += (effective * finality_delay as u128
                    / constants.inactivity_penalty_quotient as u128)
                    as u64;
            }
        }
    }

    for (index, balance) in state.balances.iter_mut().enumerate() {
        *balance = balance
            .saturating_add(rewards[index])
            .saturating_sub(penalties[index]);
    }
    Ok(())
}

fn process_registry_updates(state: &mut ChainState, constants: &ProtocolConstants, epoch: Epoch) {
    for validator in &mut state.validators {
        if validator.activation_epoch == FAR_FUTURE_EPOCH
            && !validator.slashed
            && validator.effective_balance >= constants.max_effective_balance
        {
            validator.activation_epoch = activation_exit_epoch(epoch);
        }
    }
}

fn process_effective_balance_updates(state: &mut ChainState, constants: &ProtocolConstants) {
    let increment = constants.effective_balance_increment;
    let downward = increment / 4;
    let upward = increment / 4 * 5;
    for (validator, balance) in state.validators.iter_mut().zip(&state.balances) {
        let balance = *balance;
        if balance.saturating_add(downward) < validator.effective_balance
            || validator.effective_balance.saturating_add(upward) < balance
        {
            validator.effective_balance =
                (balance - balance % increment).min(constants.max_effective_balance);
        }
    }
}
