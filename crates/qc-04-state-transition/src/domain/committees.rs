//! # Committees & Proposer Selection
//!
//! Seed-driven shuffling of the active validator set.
//!
//! The seed of epoch `E` is read from the randao mix at the last slot of
//! epoch `E - 2`. That mix is final before epoch `E - 1` starts, so the
//! committees and proposers of the next epoch are known one epoch ahead.

use crate::error::CommitteeError;
use shared_types::{
    ChainState, CommitteeIndex, Epoch, Hash, ProtocolConstants, RootHasher, Slot, ValidatorIndex,
};

/// Committees of one epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochCommittees {
    pub epoch: Epoch,
    pub committees_per_slot: u64,
    slots_per_epoch: u64,
    /// Slot-major: committee `(slot, index)` at `(slot % spe) * cps + index`.
    committees: Vec<Vec<ValidatorIndex>>,
}

impl EpochCommittees {
    /// Members of committee `index` at `slot`.
    pub fn committee(&self, slot: Slot, index: CommitteeIndex) -> Option<&[ValidatorIndex]> {
        if slot / self.slots_per_epoch != self.epoch || index >= self.committees_per_slot {
            return None;
        }
        let position = (slot % self.slots_per_epoch) * self.committees_per_slot + index;
        self.committees.get(position as usize).map(Vec::as_slice)
    }

    /// All committees as `(slot, index, members)`.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, CommitteeIndex, &[ValidatorIndex])> + '_ {
        let start = self.epoch * self.slots_per_epoch;
        let cps = self.committees_per_slot;
        self.committees.iter().enumerate().map(move |(i, members)| {
            let i = i as u64;
            (start + i / cps, i % cps, members.as_slice())
        })
    }
}

/// Fisher-Yates shuffle driven by a 32-byte seed.
pub fn shuffle_with_seed<T: Clone>(items: &[T], seed: &Hash) -> Vec<T> {
    let mut result = items.to_vec();
    let mut round = *seed;
    for i in (1..result.len()).rev() {
        round = RootHasher::new(b"shuffle").hash(&round).u64(i as u64).finish();
        let j = (hash_to_u64(&round) % (i as u64 + 1)) as usize;
        result.swap(i, j);
    }
    result
}

fn hash_to_u64(hash: &Hash) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(bytes)
}

/// Check that `epoch` lies within `[current - 2, current + 1]`.
fn check_window(
    state: &ChainState,
    constants: &ProtocolConstants,
    epoch: Epoch,
) -> Result<(), CommitteeError> {
    let current = state.current_epoch(constants);
    if epoch + 2 < current || epoch > current + 1 {
        return Err(CommitteeError::EpochOutOfRange { epoch, current });
    }
    Ok(())
}

/// Shuffling seed for `epoch`.
pub fn seed_for_epoch(
    state: &ChainState,
    constants: &ProtocolConstants,
    epoch: Epoch,
) -> Result<Hash, CommitteeError> {
    check_window(state, constants, epoch)?;
    let anchor = constants
        .epoch_start_slot(epoch)
        .saturating_sub(constants.slots_per_epoch + 1);
    let len = state.randao_mixes.len().max(1) as u64;
    let mix = state
        .randao_mixes
        .get((anchor % len) as usize)
        .ok_or(CommitteeError::MissingRandaoMix { slot: anchor })?;
    Ok(RootHasher::new(b"epoch-seed").u64(epoch).hash(mix).finish())
}

/// Committees per slot for an active set of `active_count` validators.
pub fn committees_per_slot(constants: &ProtocolConstants, active_count: usize) -> u64 {
    (active_count as u64 / constants.slots_per_epoch / constants.target_committee_size)
        .clamp(1, constants.max_committees_per_slot)
}

/// Shuffle the active set of `epoch` into `committees_per_slot * slots_per_epoch`
/// committees.
pub fn compute_committees(
    state: &ChainState,
    constants: &ProtocolConstants,
    epoch: Epoch,
) -> Result<EpochCommittees, CommitteeError> {
    let seed = seed_for_epoch(state, constants, epoch)?;
    let active = state.active_validator_indices(epoch);
    if active.is_empty() {
        return Err(CommitteeError::NoActiveValidators { epoch });
    }

    let cps = committees_per_slot(constants, active.len());
    let total = (cps * constants.slots_per_epoch) as usize;
    let shuffled = shuffle_with_seed(&active, &seed);
    let n = shuffled.len();
    let committees = (0..total)
        .map(|k| shuffled[n * k / total..n * (k + 1) / total].to_vec())
        .collect();

    Ok(EpochCommittees {
        epoch,
        committees_per_slot: cps,
        slots_per_epoch: constants.slots_per_epoch,
        committees,
    })
}

/// Proposer of `slot`, chosen uniformly among validators active at its epoch.
pub fn compute_proposer_index(
    state: &ChainState,
    constants: &ProtocolConstants,
    slot: Slot,
) -> Result<ValidatorIndex, CommitteeError> {
    let epoch = constants.epoch_at_slot(slot);
    let seed = seed_for_epoch(state, constants, epoch)?;
    let active = state.active_validator_indices(epoch);
    if active.is_empty() {
        return Err(CommitteeError::NoActiveValidators { epoch });
    }
    let pick = RootHasher::new(b"proposer").hash(&seed).u64(slot).finish();
    Ok(active[(hash_to_u64(&pick) % active.len() as u64) as usize])
}
