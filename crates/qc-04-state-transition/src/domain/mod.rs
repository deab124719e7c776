//! Domain logic of the state transition: pure functions over `ChainState`.

pub mod block;
pub mod committees;
pub mod epoch;
pub mod slot;

pub use committees::{
    committees_per_slot, compute_committees, compute_proposer_index, seed_for_epoch,
    shuffle_with_seed, EpochCommittees,
};
pub use epoch::EpochSummary;

use shared_types::{ChainState, Epoch, Hash, ProtocolConstants, Slot};

/// Epoch at which an activation or exit initiated during `epoch` takes effect.
///
/// Two epochs out so that the active set of the next epoch is already fixed
/// when its duties are computed.
pub fn activation_exit_epoch(epoch: Epoch) -> Epoch {
    epoch.saturating_add(2)
}

/// Root of the block heading the chain at `slot`, if still in the history ring.
pub fn block_root_at_slot(
    state: &ChainState,
    constants: &ProtocolConstants,
    slot: Slot,
) -> Option<Hash> {
    let len = constants.slots_per_historical_root;
    if slot >= state.slot || state.slot > slot.saturating_add(len) {
        return None;
    }
    state.block_roots.get((slot % len) as usize).copied()
}

/// Largest `x` with `x * x <= n`.
pub fn integer_sqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = n / 2 + n % 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}
