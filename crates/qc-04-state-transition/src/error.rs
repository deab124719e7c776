//! Error types for the state transition subsystem
//!
//! Every kind here is fatal to the transition attempt that raised it.
//! Callers must propagate them and never retry the same transition.

use shared_types::{CommitteeIndex, Epoch, Hash, Slot, ValidatorIndex};
use thiserror::Error;

/// Result type alias for state transition operations
pub type Result<T> = std::result::Result<T, StateTransitionError>;

/// Failure while advancing across an empty slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotProcessingError {
    /// Advance requested to a slot older than the state.
    #[error("Cannot advance state at slot {current} back to slot {target}")]
    TargetInPast { current: Slot, target: Slot },

    /// State buffers do not match the protocol constants.
    #[error("Malformed state at slot {slot}: {reason}")]
    MalformedState { slot: Slot, reason: String },

    /// Slot counter would overflow.
    #[error("Slot overflow")]
    SlotOverflow,
}

/// Failure while computing shuffling for an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitteeError {
    /// Epoch is outside the window whose seed the state still holds.
    #[error("Epoch {epoch} outside committee window of state at epoch {current}")]
    EpochOutOfRange { epoch: Epoch, current: Epoch },

    /// No validator is active at the epoch.
    #[error("No active validators at epoch {epoch}")]
    NoActiveValidators { epoch: Epoch },

    /// Randao ring is shorter than the protocol requires.
    #[error("Randao mix for slot {slot} missing")]
    MissingRandaoMix { slot: Slot },
}

/// Failure while processing an epoch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpochProcessingError {
    /// State buffers are inconsistent with each other.
    #[error("Malformed state at epoch {epoch}: {reason}")]
    MalformedState { epoch: Epoch, reason: String },

    /// A block root needed for justification has left the history ring.
    #[error("Block root for slot {slot} unavailable")]
    BlockRootUnavailable { slot: Slot },

    /// Committees for a pending attestation could not be computed.
    #[error("Committee computation failed: {0}")]
    Committee(#[from] CommitteeError),
}

/// Attestation rejected by block processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    #[error("Committee index {index} out of range ({committees} committees per slot)")]
    CommitteeIndexOutOfRange {
        index: CommitteeIndex,
        committees: u64,
    },

    #[error("Target epoch {target} is neither current ({current}) nor previous")]
    TargetEpochOutOfRange { target: Epoch, current: Epoch },

    #[error("Target epoch {target} does not contain attestation slot {slot}")]
    TargetEpochMismatch { target: Epoch, slot: Slot },

    #[error("Attestation for slot {attestation_slot} included too early at slot {state_slot}")]
    InclusionTooEarly {
        attestation_slot: Slot,
        state_slot: Slot,
    },

    #[error("Attestation for slot {attestation_slot} included too late at slot {state_slot}")]
    InclusionTooLate {
        attestation_slot: Slot,
        state_slot: Slot,
    },

    #[error("Aggregation bits length {actual} does not match committee size {expected}")]
    AggregationBitsLength { expected: usize, actual: usize },

    #[error("Attestation has no participants")]
    NoParticipants,

    #[error("Source checkpoint does not match the justified checkpoint")]
    SourceMismatch,

    #[error("Committee lookup failed: {0}")]
    Committee(#[from] CommitteeError),
}

/// Failure while applying a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockProcessingError {
    #[error("Malformed state: {0}")]
    MalformedState(#[from] SlotProcessingError),

    #[error("State at slot {slot} has {validators} validators but {balances} balances")]
    BalancesLength {
        slot: Slot,
        validators: usize,
        balances: usize,
    },

    #[error("Block slot {block_slot} does not match state slot {state_slot}")]
    SlotMismatch { state_slot: Slot, block_slot: Slot },

    #[error("Block slot {block_slot} not newer than latest header slot {latest_slot}")]
    NotNewerThanLatest { block_slot: Slot, latest_slot: Slot },

    #[error("Proposer mismatch: expected {expected}, got {actual}")]
    ProposerMismatch {
        expected: ValidatorIndex,
        actual: ValidatorIndex,
    },

    #[error("Parent root mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    ParentRootMismatch { expected: Hash, actual: Hash },

    #[error("Proposer {index} is slashed")]
    ProposerSlashed { index: ValidatorIndex },

    #[error("Unknown validator {index}")]
    UnknownValidator { index: ValidatorIndex },

    #[error("Randao reveal is empty")]
    EmptyRandaoReveal,

    #[error("Too many {kind}: {count} > {max}")]
    TooManyOperations {
        kind: &'static str,
        count: usize,
        max: usize,
    },

    #[error("Invalid attestation: {0}")]
    InvalidAttestation(#[from] AttestationError),

    #[error("Invalid proposer slashing: {reason}")]
    InvalidProposerSlashing { reason: &'static str },

    #[error("Expected {expected} deposits, block has {actual}")]
    DepositCountMismatch { expected: u64, actual: u64 },

    #[error("Deposit index mismatch: expected {expected}, got {actual}")]
    DepositIndexMismatch { expected: u64, actual: u64 },

    #[error("State root mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    StateRootMismatch { expected: Hash, actual: Hash },

    #[error("Committee lookup failed: {0}")]
    Committee(#[from] CommitteeError),
}

/// Any state transition failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateTransitionError {
    #[error("Slot processing failed: {0}")]
    Slot(#[from] SlotProcessingError),

    #[error("Epoch processing failed: {0}")]
    Epoch(#[from] EpochProcessingError),

    #[error("Block processing failed: {0}")]
    Block(#[from] BlockProcessingError),
}

impl StateTransitionError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Slot(_) => "slot",
            Self::Epoch(_) => "epoch",
            Self::Block(_) => "block",
        }
    }

    /// Transition failures indicate a logic or data fault, never a
    /// transient condition.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

impl From<CommitteeError> for StateTransitionError {
    fn from(err: CommitteeError) -> Self {
        Self::Block(BlockProcessingError::Committee(err))
    }
}
