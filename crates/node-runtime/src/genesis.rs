//! # Genesis
//!
//! Builds the genesis state and block of a development network from a
//! deterministic validator set.

use qc_15_deposit_chain::DepositLog;
use shared_types::{
    keccak256, BlsPublicKey, CandidateBlock, ChainState, DepositData, ExternalDataRecord, Fork,
    HashRoot, ProtocolConstants, Validator, EMPTY_SIGNATURE,
};
use thiserror::Error;
use tracing::info;

/// Genesis creation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenesisError {
    /// Genesis needs at least one active validator.
    #[error("Genesis validator set is empty")]
    NoValidators,

    /// Committees need a validator for every slot of the first epoch.
    #[error("Genesis has {count} validators, at least {required} required")]
    TooFewValidators { count: usize, required: u64 },
}

/// Public key of development validator `index`.
///
/// Keys are derived from the index alone, so every node of a development
/// network agrees on the validator set without exchanging it.
pub fn dev_pubkey(index: u64) -> BlsPublicKey {
    let mut key = [0u8; 48];
    let head = keccak256(&[b"qc-dev-key".as_slice(), &index.to_le_bytes()].concat());
    let tail = keccak256(&head);
    key[..32].copy_from_slice(&head);
    key[32..].copy_from_slice(&tail[..16]);
    key
}

/// Genesis state and block, anchored together.
#[derive(Clone, Debug)]
pub struct Genesis {
    pub state: ChainState,
    pub block: CandidateBlock,
}

/// Genesis builder.
pub struct GenesisBuilder {
    genesis_time: u64,
    validator_count: usize,
    constants: ProtocolConstants,
}

impl GenesisBuilder {
    pub fn new(genesis_time: u64, validator_count: usize, constants: ProtocolConstants) -> Self {
        Self {
            genesis_time,
            validator_count,
            constants,
        }
    }

    /// Build genesis, recording the initial deposits in `log`.
    ///
    /// The genesis external-data record covers exactly those deposits, so
    /// the first blocks carry none.
    pub fn build(&self, log: &DepositLog) -> Result<Genesis, GenesisError> {
        if self.validator_count == 0 {
            return Err(GenesisError::NoValidators);
        }
        if (self.validator_count as u64) < self.constants.slots_per_epoch {
            return Err(GenesisError::TooFewValidators {
                count: self.validator_count,
                required: self.constants.slots_per_epoch,
            });
        }

        let validators: Vec<Validator> = (0..self.validator_count as u64)
            .map(|index| {
                let pubkey = dev_pubkey(index);
                log.record(DepositData {
                    pubkey,
                    withdrawal_credentials: keccak256(&pubkey),
                    amount: self.constants.max_effective_balance,
                    signature: EMPTY_SIGNATURE,
                });
                Validator::genesis(pubkey, self.constants.max_effective_balance)
            })
            .collect();

        let deposit_count = log.len();
        let external_data = ExternalDataRecord {
            deposit_root: log.deposit_root(deposit_count).unwrap_or_default(),
            deposit_count,
            block_hash: keccak256(b"qc-dev-genesis"),
        };

        let state = ChainState::genesis(
            self.genesis_time,
            validators,
            external_data,
            Fork::default(),
            &self.constants,
        );
        let block = CandidateBlock::genesis(state.hash_root());
        info!(
            validators = self.validator_count,
            genesis_time = self.genesis_time,
            root = %hex::encode(&block.root()[..8]),
            "Genesis created"
        );
        Ok(Genesis { state, block })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_keys_are_distinct_and_stable() {
        assert_eq!(dev_pubkey(3), dev_pubkey(3));
        assert_ne!(dev_pubkey(3), dev_pubkey(4));
    }

    #[test]
    fn test_build_records_deposits() {
        let log = DepositLog::new();
        let genesis = GenesisBuilder::new(1_000, 16, ProtocolConstants::minimal())
            .build(&log)
            .unwrap();

        assert_eq!(log.len(), 16);
        assert_eq!(genesis.state.validators.len(), 16);
        assert_eq!(genesis.state.deposit_index, 16);
        assert_eq!(genesis.state.external_data.deposit_count, 16);
        assert_eq!(genesis.block.state_root, genesis.state.hash_root());
        assert_eq!(genesis.state.validator_index(&dev_pubkey(5)), Some(5));
    }

    #[test]
    fn test_small_sets_rejected() {
        let log = DepositLog::new();
        let builder = GenesisBuilder::new(0, 4, ProtocolConstants::minimal());
        assert_eq!(
            builder.build(&log).unwrap_err(),
            GenesisError::TooFewValidators {
                count: 4,
                required: 8
            }
        );
        assert_eq!(
            GenesisBuilder::new(0, 0, ProtocolConstants::minimal())
                .build(&log)
                .unwrap_err(),
            GenesisError::NoValidators
        );
    }
}
