//! Append-only log of deposits seen in the deposit contract.

use parking_lot::RwLock;
use shared_types::{ChainState, Deposit, DepositData, Hash, HashRoot};
use tracing::debug;

/// Deposits indexed by their position in the contract log.
///
/// Indices are dense and start at zero: the deposit at position `i` carries
/// `index == i`.
#[derive(Debug, Default)]
pub struct DepositLog {
    deposits: RwLock<Vec<Deposit>>,
}

impl DepositLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a deposit, assigning the next index.
    pub fn record(&self, data: DepositData) -> Deposit {
        let mut deposits = self.deposits.write();
        let deposit = Deposit {
            index: deposits.len() as u64,
            data,
        };
        deposits.push(deposit.clone());
        debug!(index = deposit.index, amount = deposit.data.amount, "[qc-15] Deposit recorded");
        deposit
    }

    pub fn len(&self) -> u64 {
        self.deposits.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.read().is_empty()
    }

    /// Root over the first `count` deposits, if that many are known.
    pub fn deposit_root(&self, count: u64) -> Option<Hash> {
        let deposits = self.deposits.read();
        deposits.get(..count as usize).map(|prefix| prefix.hash_root())
    }

    /// Up to `max` deposits the chain has not processed yet, in index order.
    pub fn deposits_for(&self, state: &ChainState, max: usize) -> Vec<Deposit> {
        let deposits = self.deposits.read();
        deposits
            .iter()
            .skip(state.deposit_index as usize)
            .take(max)
            .cloned()
            .collect()
    }
}
