//! # Duty Domain
//!
//! Duties a validator performs within one epoch, the node's raw assignment
//! answer they are built from, and the aggregation messages.

mod backoff;

pub use backoff::backoff_delay_ms;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{
    keccak256, Attestation, BlsPublicKey, BlsSignature, CommitteeIndex, Epoch,
    Fork, Hash, HashRoot, RootHasher, Slot, ValidatorIndex, Version,
};
use std::collections::BTreeMap;

/// Fork context used for signing domains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkInfo {
    pub fork: Fork,
    pub genesis_validators_root: Hash,
}

impl ForkInfo {
    /// Version that signatures for `epoch` commit to.
    pub fn version_at(&self, epoch: Epoch) -> Version {
        self.fork.version_at(epoch)
    }
}

/// Assignments of one validator for one epoch, as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDuties {
    #[serde(with = "pubkey_hex")]
    pub pubkey: BlsPublicKey,
    pub validator_index: ValidatorIndex,
    pub attestation_slot: Slot,
    pub attestation_committee_index: CommitteeIndex,
    pub attestation_committee_position: usize,
    pub committee_size: usize,
    pub block_proposal_slots: Vec<Slot>,
}

mod pubkey_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use shared_types::BlsPublicKey;

    pub fn serialize<S: Serializer>(key: &BlsPublicKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BlsPublicKey, D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(text.trim_start_matches("0x")).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("public key must be 48 bytes"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DutyKind {
    Proposal,
    Attestation,
    Aggregation,
}

impl DutyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Attestation => "attestation",
            Self::Aggregation => "aggregation",
        }
    }
}

/// Committee membership carried by attestation and aggregation duties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitteeAssignment {
    pub committee_index: CommitteeIndex,
    pub committee_position: usize,
    pub committee_size: usize,
}

/// One action due at a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Duty {
    Proposal {
        slot: Slot,
        validator_index: ValidatorIndex,
        pubkey: BlsPublicKey,
    },
    Attestation {
        slot: Slot,
        validator_index: ValidatorIndex,
        pubkey: BlsPublicKey,
        committee: CommitteeAssignment,
    },
    Aggregation {
        slot: Slot,
        validator_index: ValidatorIndex,
        pubkey: BlsPublicKey,
        committee: CommitteeAssignment,
        selection_proof: BlsSignature,
    },
}

impl Duty {
    pub fn slot(&self) -> Slot {
        match self {
            Self::Proposal { slot, .. }
            | Self::Attestation { slot, .. }
            | Self::Aggregation { slot, .. } => *slot,
        }
    }

    pub fn validator_index(&self) -> ValidatorIndex {
        match self {
            Self::Proposal {
                validator_index, ..
            }
            | Self::Attestation {
                validator_index, ..
            }
            | Self::Aggregation {
                validator_index, ..
            } => *validator_index,
        }
    }

    pub fn kind(&self) -> DutyKind {
        match self {
            Self::Proposal { .. } => DutyKind::Proposal,
            Self::Attestation { .. } => DutyKind::Attestation,
            Self::Aggregation { .. } => DutyKind::Aggregation,
        }
    }
}

/// Every duty of the local validators for one epoch.
///
/// Built once per epoch and shared behind an `Arc`; never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledDutySet {
    pub epoch: Epoch,
    pub fork: ForkInfo,
    duties: BTreeMap<Slot, Vec<Duty>>,
}

impl ScheduledDutySet {
    pub fn new(epoch: Epoch, fork: ForkInfo, duties: impl IntoIterator<Item = Duty>) -> Self {
        let mut by_slot: BTreeMap<Slot, Vec<Duty>> = BTreeMap::new();
        for duty in duties {
            by_slot.entry(duty.slot()).or_default().push(duty);
        }
        // Proposals first within a slot.
        for slot_duties in by_slot.values_mut() {
            slot_duties.sort_by_key(|d| (d.kind(), d.validator_index()));
        }
        Self {
            epoch,
            fork,
            duties: by_slot,
        }
    }

    /// Duties due at `slot`.
    pub fn duties_at(&self, slot: Slot) -> &[Duty] {
        self.duties.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.duties.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.duties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duty> {
        self.duties.values().flatten()
    }
}

/// Whether a selection proof elects its signer as aggregator.
///
/// Roughly `target` members of a committee are selected.
pub fn is_aggregator(selection_proof: &BlsSignature, committee_size: usize, target: u64) -> bool {
    let modulo = (committee_size as u64 / target.max(1)).max(1);
    let digest = keccak256(selection_proof);
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word) % modulo == 0
}

/// Aggregate offered by an elected aggregator.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateAndProof {
    pub aggregator_index: ValidatorIndex,
    pub aggregate: Attestation,
    #[serde_as(as = "Bytes")]
    pub selection_proof: BlsSignature,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAggregateAndProof {
    pub message: AggregateAndProof,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignature,
}

impl HashRoot for AggregateAndProof {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"AggregateAndProof")
            .u64(self.aggregator_index)
            .field(&self.aggregate)
            .bytes(&self.selection_proof)
            .finish()
    }
}

/// Root a slot signature commits to, for selection proofs.
pub fn slot_signing_root(slot: Slot) -> Hash {
    RootHasher::new(b"AggregationSlot").u64(slot).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ForkInfo {
        ForkInfo {
            fork: Fork::default(),
            genesis_validators_root: [7; 32],
        }
    }

    #[test]
    fn test_duty_set_orders_and_groups() {
        let set = ScheduledDutySet::new(
            1,
            info(),
            vec![
                Duty::Attestation {
                    slot: 9,
                    validator_index: 0,
                    pubkey: [0; 48],
                    committee: CommitteeAssignment {
                        committee_index: 0,
                        committee_position: 0,
                        committee_size: 4,
                    },
                },
                Duty::Proposal {
                    slot: 9,
                    validator_index: 3,
                    pubkey: [3; 48],
                },
                Duty::Proposal {
                    slot: 12,
                    validator_index: 0,
                    pubkey: [0; 48],
                },
            ],
        );
        assert_eq!(set.len(), 3);
        assert_eq!(set.duties_at(9)[0].kind(), DutyKind::Proposal);
        assert_eq!(set.duties_at(9)[1].kind(), DutyKind::Attestation);
        assert!(set.duties_at(10).is_empty());
    }

    #[test]
    fn test_aggregator_selection() {
        // Small committees always aggregate.
        assert!(is_aggregator(&[5; 96], 4, 16));
        let elected = (0u8..=255)
            .filter(|b| is_aggregator(&[*b; 96], 128, 16))
            .count();
        assert!(elected > 0 && elected < 256);
    }

    #[test]
    fn test_validator_duties_json() {
        let duties = ValidatorDuties {
            pubkey: [0xab; 48],
            validator_index: 2,
            attestation_slot: 9,
            attestation_committee_index: 0,
            attestation_committee_position: 1,
            committee_size: 3,
            block_proposal_slots: vec![10],
        };
        let json = serde_json::to_string(&duties).unwrap();
        assert!(json.contains(&"ab".repeat(48)));
        let back: ValidatorDuties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, duties);
    }
}
