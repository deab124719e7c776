//! # Core Domain Entities
//!
//! Defines the beacon-chain entities exchanged between subsystems.
//!
//! ## Clusters
//!
//! - **Time**: `Slot`, `Epoch`, `Fork`
//! - **Chain**: `CandidateBlock`, `SignedBlock`, `BlockHeader`, `BlockBody`
//! - **Operations**: `Attestation`, `Deposit`, `ProposerSlashing`
//! - **State**: `ChainState`, `Validator`, `Checkpoint`, `ExternalDataRecord`

use crate::hashing::HashRoot;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

// =============================================================================
// CLUSTER A: PRIMITIVES
// =============================================================================

/// A 32-byte Keccak-256 root.
pub type Hash = [u8; 32];

/// Fixed-duration unit of protocol time.
pub type Slot = u64;

/// Group of `slots_per_epoch` consecutive slots.
pub type Epoch = u64;

/// Position of a validator in the state registry.
pub type ValidatorIndex = u64;

/// Index of a committee within a slot.
pub type CommitteeIndex = u64;

/// Attestation gossip sub-topic identifier.
pub type SubnetId = u64;

/// Balance unit.
pub type Gwei = u64;

/// 48-byte BLS public key.
pub type BlsPublicKey = [u8; 48];

/// 96-byte BLS signature.
pub type BlsSignature = [u8; 96];

/// 4-byte fork version.
pub type Version = [u8; 4];

/// The all-zero root.
pub const ZERO_HASH: Hash = [0u8; 32];

/// The all-zero signature (used for unsigned placeholders).
pub const EMPTY_SIGNATURE: BlsSignature = [0u8; 96];

/// Sentinel for "never" epochs.
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

// =============================================================================
// CLUSTER B: FORK & CHECKPOINTS
// =============================================================================

/// Protocol fork schedule entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fork {
    /// Version in force before `epoch`.
    pub previous_version: Version,
    /// Version in force from `epoch` onward.
    pub current_version: Version,
    /// Activation epoch of `current_version`.
    pub epoch: Epoch,
}

impl Fork {
    /// Fork version applicable to duties targeting `epoch`.
    pub fn version_at(&self, epoch: Epoch) -> Version {
        if epoch < self.epoch {
            self.previous_version
        } else {
            self.current_version
        }
    }
}

/// Epoch-boundary checkpoint used by Casper FFG.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash,
}

impl Checkpoint {
    pub fn new(epoch: Epoch, root: Hash) -> Self {
        Self { epoch, root }
    }
}

// =============================================================================
// CLUSTER C: VALIDATORS
// =============================================================================

/// Validator registry record.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    #[serde_as(as = "Bytes")]
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: Hash,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Validator {
    /// A validator active from genesis.
    pub fn genesis(pubkey: BlsPublicKey, effective_balance: Gwei) -> Self {
        Self {
            pubkey,
            withdrawal_credentials: ZERO_HASH,
            effective_balance,
            slashed: false,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    /// Check if active at `epoch`.
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    /// Check if the validator may still be slashed at `epoch`.
    pub fn is_slashable_at(&self, epoch: Epoch) -> bool {
        !self.slashed && self.activation_epoch <= epoch && epoch < self.withdrawable_epoch
    }
}

// =============================================================================
// CLUSTER D: EXTERNAL (DEPOSIT) CHAIN
// =============================================================================

/// Reference to the deposit-chain state, voted on by proposers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalDataRecord {
    pub deposit_root: Hash,
    pub deposit_count: u64,
    pub block_hash: Hash,
}

/// Deposit payload submitted on the deposit chain.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositData {
    #[serde_as(as = "Bytes")]
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: Hash,
    pub amount: Gwei,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignature,
}

/// Deposit with its position in the deposit contract log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub index: u64,
    pub data: DepositData,
}

// =============================================================================
// CLUSTER E: ATTESTATIONS & SLASHINGS
// =============================================================================

/// The vote an attester signs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub beacon_block_root: Hash,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

/// Aggregatable attestation.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// One bit per committee member.
    pub aggregation_bits: Vec<bool>,
    pub data: AttestationData,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignature,
}

impl Attestation {
    /// Number of committee members covered by this attestation.
    pub fn participant_count(&self) -> usize {
        self.aggregation_bits.iter().filter(|bit| **bit).count()
    }
}

/// Attestation recorded in state for epoch processing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttestation {
    pub aggregation_bits: Vec<bool>,
    pub data: AttestationData,
    pub inclusion_delay: u64,
    pub proposer_index: ValidatorIndex,
}

/// Header of a block, the unit hashed into `block_roots`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Hash,
    pub state_root: Hash,
    pub body_root: Hash,
}

/// Header plus proposer signature.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub message: BlockHeader,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignature,
}

/// Evidence that a proposer signed two different headers for one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerSlashing {
    pub signed_header_1: SignedBlockHeader,
    pub signed_header_2: SignedBlockHeader,
}

// =============================================================================
// CLUSTER F: BLOCKS
// =============================================================================

/// Operation body of a block.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    /// Proposer's randao contribution.
    #[serde_as(as = "Bytes")]
    pub randao_reveal: BlsSignature,
    /// External-data vote.
    pub external_data: ExternalDataRecord,
    pub graffiti: Hash,
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
}

impl Default for BlockBody {
    fn default() -> Self {
        Self {
            randao_reveal: EMPTY_SIGNATURE,
            external_data: ExternalDataRecord::default(),
            graffiti: ZERO_HASH,
            proposer_slashings: Vec::new(),
            attestations: Vec::new(),
            deposits: Vec::new(),
        }
    }
}

/// Unsigned block produced by the block assembler.
///
/// INVARIANT: `parent_root` is the root of the block heading the chain at
/// `slot - 1`; `proposer_index` is the proposer selected for `slot` by the
/// state advanced to `slot`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateBlock {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Hash,
    pub state_root: Hash,
    pub body: BlockBody,
}

impl CandidateBlock {
    /// Genesis block anchoring a genesis state with the given root.
    pub fn genesis(state_root: Hash) -> Self {
        Self {
            slot: 0,
            proposer_index: 0,
            parent_root: ZERO_HASH,
            state_root,
            body: BlockBody::default(),
        }
    }

    /// Header view of this block.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.hash_root(),
        }
    }

    /// Block root (equal to the root of its header).
    pub fn root(&self) -> Hash {
        self.header().hash_root()
    }
}

/// Block with the proposer's signature.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub message: CandidateBlock,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignature,
}

// =============================================================================
// CLUSTER G: CHAIN STATE
// =============================================================================

/// Chain state as of `slot`.
///
/// Treated as an immutable snapshot: the state-transition subsystem clones
/// its input and returns a new value; consumers share it by reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub genesis_time: u64,
    pub genesis_validators_root: Hash,
    pub slot: Slot,
    pub fork: Fork,
    pub latest_block_header: BlockHeader,
    /// Ring buffer of block roots indexed by `slot % slots_per_historical_root`.
    pub block_roots: Vec<Hash>,
    /// Ring buffer of randao mixes indexed by `slot % randao_mixes_length`.
    pub randao_mixes: Vec<Hash>,
    pub external_data: ExternalDataRecord,
    pub external_data_votes: Vec<ExternalDataRecord>,
    pub deposit_index: u64,
    pub validators: Vec<Validator>,
    pub balances: Vec<Gwei>,
    pub previous_epoch_attestations: Vec<PendingAttestation>,
    pub current_epoch_attestations: Vec<PendingAttestation>,
    /// Most recent epoch first.
    pub justification_bits: [bool; 4],
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl ChainState {
    /// Build a genesis state from an initial validator set.
    pub fn genesis(
        genesis_time: u64,
        validators: Vec<Validator>,
        external_data: ExternalDataRecord,
        fork: Fork,
        constants: &crate::ProtocolConstants,
    ) -> Self {
        let balances = validators.iter().map(|v| v.effective_balance).collect();
        let genesis_validators_root = validators.hash_root();
        let mix = crate::hashing::RootHasher::new(b"genesis-mix")
            .hash(&genesis_validators_root)
            .u64(genesis_time)
            .finish();
        Self {
            genesis_time,
            genesis_validators_root,
            slot: 0,
            fork,
            latest_block_header: BlockHeader {
                body_root: BlockBody::default().hash_root(),
                ..BlockHeader::default()
            },
            block_roots: vec![ZERO_HASH; constants.slots_per_historical_root as usize],
            randao_mixes: vec![mix; constants.randao_mixes_length as usize],
            external_data,
            external_data_votes: Vec::new(),
            deposit_index: external_data.deposit_count,
            validators,
            balances,
            previous_epoch_attestations: Vec::new(),
            current_epoch_attestations: Vec::new(),
            justification_bits: [false; 4],
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
        }
    }

    /// Epoch of `self.slot`.
    pub fn current_epoch(&self, constants: &crate::ProtocolConstants) -> Epoch {
        constants.epoch_at_slot(self.slot)
    }

    /// Indices of validators active at `epoch`.
    pub fn active_validator_indices(&self, epoch: Epoch) -> Vec<ValidatorIndex> {
        self.validators
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_active_at(epoch))
            .map(|(i, _)| i as ValidatorIndex)
            .collect()
    }

    /// Sum of effective balances of validators active at `epoch`.
    pub fn total_active_balance(&self, epoch: Epoch) -> Gwei {
        self.validators
            .iter()
            .filter(|v| v.is_active_at(epoch))
            .map(|v| v.effective_balance)
            .fold(0u64, |acc, b| acc.saturating_add(b))
    }

    /// Registry index of `pubkey`, if known.
    pub fn validator_index(&self, pubkey: &BlsPublicKey) -> Option<ValidatorIndex> {
        self.validators
            .iter()
            .position(|v| &v.pubkey == pubkey)
            .map(|i| i as ValidatorIndex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolConstants;

    fn pubkey(n: u8) -> BlsPublicKey {
        [n; 48]
    }

    #[test]
    fn test_fork_version_at() {
        let fork = Fork {
            previous_version: [0, 0, 0, 0],
            current_version: [1, 0, 0, 0],
            epoch: 10,
        };
        assert_eq!(fork.version_at(9), [0, 0, 0, 0]);
        assert_eq!(fork.version_at(10), [1, 0, 0, 0]);
    }

    #[test]
    fn test_validator_activity() {
        let mut v = Validator::genesis(pubkey(1), 32);
        assert!(v.is_active_at(0));
        v.exit_epoch = 5;
        assert!(v.is_active_at(4));
        assert!(!v.is_active_at(5));
    }

    #[test]
    fn test_participant_count() {
        let attestation = Attestation {
            aggregation_bits: vec![true, false, true, true],
            data: AttestationData::default(),
            signature: EMPTY_SIGNATURE,
        };
        assert_eq!(attestation.participant_count(), 3);
    }

    #[test]
    fn test_genesis_state() {
        let constants = ProtocolConstants::minimal();
        let validators = (0..4).map(|i| Validator::genesis(pubkey(i), 32)).collect();
        let state = ChainState::genesis(
            1_600_000_000,
            validators,
            ExternalDataRecord::default(),
            Fork::default(),
            &constants,
        );

        assert_eq!(state.slot, 0);
        assert_eq!(state.balances, vec![32; 4]);
        assert_eq!(state.block_roots.len() as u64, constants.slots_per_historical_root);
        assert_eq!(state.randao_mixes.len() as u64, constants.randao_mixes_length);
        assert_eq!(state.total_active_balance(0), 128);
        assert_eq!(state.validator_index(&pubkey(2)), Some(2));
    }

    #[test]
    fn test_genesis_block_matches_genesis_header() {
        let constants = ProtocolConstants::minimal();
        let state = ChainState::genesis(
            0,
            vec![Validator::genesis(pubkey(1), 32)],
            ExternalDataRecord::default(),
            Fork::default(),
            &constants,
        );
        let block = CandidateBlock::genesis(state.hash_root());

        let mut header = state.latest_block_header;
        header.state_root = state.hash_root();
        assert_eq!(block.root(), header.hash_root());
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let attestation = Attestation {
            aggregation_bits: vec![true],
            data: AttestationData::default(),
            signature: [7u8; 96],
        };
        let json = serde_json::to_string(&attestation).unwrap();
        let decoded: Attestation = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, attestation);
    }
}
