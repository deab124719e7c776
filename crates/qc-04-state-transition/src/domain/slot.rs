//! Per-slot bookkeeping.

use crate::error::SlotProcessingError;
use shared_types::{ChainState, HashRoot, ProtocolConstants, ZERO_HASH};

/// Check ring buffer lengths against the protocol constants.
pub fn check_shape(
    state: &ChainState,
    constants: &ProtocolConstants,
) -> Result<(), SlotProcessingError> {
    if state.block_roots.len() as u64 != constants.slots_per_historical_root {
        return Err(SlotProcessingError::MalformedState {
            slot: state.slot,
            reason: format!(
                "block_roots has {} entries, expected {}",
                state.block_roots.len(),
                constants.slots_per_historical_root
            ),
        });
    }
    if state.randao_mixes.len() as u64 != constants.randao_mixes_length {
        return Err(SlotProcessingError::MalformedState {
            slot: state.slot,
            reason: format!(
                "randao_mixes has {} entries, expected {}",
                state.randao_mixes.len(),
                constants.randao_mixes_length
            ),
        });
    }
    Ok(())
}

/// Move `state` from `slot` to `slot + 1`.
///
/// Caches the state root into an unfilled latest header, carries the randao
/// mix forward into the next slot's position and records the latest header
/// root for the slot being left.
pub fn process_slot(
    state: &mut ChainState,
    constants: &ProtocolConstants,
) -> Result<(), SlotProcessingError> {
    check_shape(state, constants)?;
    let next_slot = state
        .slot
        .checked_add(1)
        .ok_or(SlotProcessingError::SlotOverflow)?;

    if state.latest_block_header.state_root == ZERO_HASH {
        state.latest_block_header.state_root = state.hash_root();
    }

    // Randao mix rotation
    let mixes = constants.randao_mixes_length;
    let mix = state.randao_mixes[(state.slot % mixes) as usize];
    state.randao_mixes[(next_slot % mixes) as usize] = mix;

    // Recent block roots
    let roots = constants.slots_per_historical_root;
    state.block_roots[(state.slot % roots) as usize] = state.latest_block_header.hash_root();

    state.slot = next_slot;
    Ok(())
}
