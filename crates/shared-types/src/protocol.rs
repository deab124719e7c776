//! # Protocol Constants
//!
//! Numeric parameters of the consensus protocol. Loaded once at startup and
//! shared read-only by every subsystem.

use crate::entities::{CommitteeIndex, Epoch, Gwei, Slot, SubnetId};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Protocol constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConstants {
    pub slots_per_epoch: u64,
    /// Length of the `block_roots` ring.
    pub slots_per_historical_root: u64,
    /// Length of the `randao_mixes` ring.
    pub randao_mixes_length: u64,
    pub max_committees_per_slot: u64,
    pub target_committee_size: u64,
    pub max_attestations: usize,
    pub max_deposits: usize,
    pub max_proposer_slashings: usize,
    pub attestation_subnet_count: u64,
    pub min_attestation_inclusion_delay: u64,
    pub epochs_per_eth1_voting_period: u64,
    pub target_aggregators_per_committee: u64,
    pub max_effective_balance: Gwei,
    pub effective_balance_increment: Gwei,
    pub base_reward_factor: u64,
    pub inactivity_penalty_quotient: u64,
    pub min_slashing_penalty_quotient: u64,
    pub min_validator_withdrawability_delay: u64,
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            slots_per_epoch: 32,
            slots_per_historical_root: 8192,
            randao_mixes_length: 65536,
            max_committees_per_slot: 64,
            target_committee_size: 128,
            max_attestations: 128,
            max_deposits: 16,
            max_proposer_slashings: 16,
            attestation_subnet_count: 64,
            min_attestation_inclusion_delay: 1,
            epochs_per_eth1_voting_period: 32,
            target_aggregators_per_committee: 16,
            max_effective_balance: 32_000_000_000,
            effective_balance_increment: 1_000_000_000,
            base_reward_factor: 64,
            inactivity_penalty_quotient: 1 << 25,
            min_slashing_penalty_quotient: 32,
            min_validator_withdrawability_delay: 256,
        }
    }
}

impl ProtocolConstants {
    /// Small preset for local networks and tests.
    pub fn minimal() -> Self {
        Self {
            slots_per_epoch: 8,
            slots_per_historical_root: 64,
            randao_mixes_length: 64,
            max_committees_per_slot: 4,
            target_committee_size: 4,
            epochs_per_eth1_voting_period: 4,
            target_aggregators_per_committee: 16,
            ..Self::default()
        }
    }

    /// Epoch containing `slot`.
    pub fn epoch_at_slot(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch
    }

    /// First slot of `epoch`.
    pub fn epoch_start_slot(&self, epoch: Epoch) -> Slot {
        epoch.saturating_mul(self.slots_per_epoch)
    }

    pub fn is_epoch_start(&self, slot: Slot) -> bool {
        slot % self.slots_per_epoch == 0
    }

    /// Gossip subnet carrying attestations for `committee_index`.
    pub fn subnet_for_committee(&self, committee_index: CommitteeIndex) -> SubnetId {
        committee_index % self.attestation_subnet_count
    }

    /// Slots in one external-data voting period.
    pub fn slots_per_voting_period(&self) -> u64 {
        self.epochs_per_eth1_voting_period * self.slots_per_epoch
    }

    /// Reject zero or mutually inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("slots_per_epoch", self.slots_per_epoch),
            ("slots_per_historical_root", self.slots_per_historical_root),
            ("randao_mixes_length", self.randao_mixes_length),
            ("max_committees_per_slot", self.max_committees_per_slot),
            ("target_committee_size", self.target_committee_size),
            ("attestation_subnet_count", self.attestation_subnet_count),
            ("epochs_per_eth1_voting_period", self.epochs_per_eth1_voting_period),
            ("target_aggregators_per_committee", self.target_aggregators_per_committee),
            ("effective_balance_increment", self.effective_balance_increment),
            ("base_reward_factor", self.base_reward_factor),
            ("inactivity_penalty_quotient", self.inactivity_penalty_quotient),
            ("min_slashing_penalty_quotient", self.min_slashing_penalty_quotient),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        if self.max_attestations == 0 {
            return Err(ConfigError::invalid("max_attestations", "must be greater than zero"));
        }

        // Epoch processing reads roots of the previous two epoch starts.
        if self.slots_per_historical_root < 2 * self.slots_per_epoch {
            return Err(ConfigError::invalid(
                "slots_per_historical_root",
                "must cover at least two epochs",
            ));
        }
        // Shuffling seeds are read back from the mix ring up to four epochs later.
        if self.randao_mixes_length < 5 * self.slots_per_epoch {
            return Err(ConfigError::invalid(
                "randao_mixes_length",
                "must cover at least five epochs",
            ));
        }
        if self.max_effective_balance < self.effective_balance_increment {
            return Err(ConfigError::invalid(
                "max_effective_balance",
                "must be at least one effective balance increment",
            ));
        }
        Ok(())
    }
}
