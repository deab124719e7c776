//! Error types for validator duties

use shared_types::{Epoch, GateError, Slot};
use thiserror::Error;

/// Failure reported by the beacon node's validator API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Node unreachable or not ready (syncing, restarting)
    #[error("Validator API unavailable: {0}")]
    Unavailable(String),

    /// Node refused the request
    #[error("Validator API rejected request: {0}")]
    Rejected(String),
}

/// Failure of the signing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("Signer unavailable: {0}")]
    Unavailable(String),

    /// Signing would violate slashing protection
    #[error("Signer refused to sign: {0}")]
    Refused(String),

    #[error("No key for validator 0x{0}")]
    UnknownKey(String),
}

/// Fork context could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkLookupError {
    #[error("Fork lookup for epoch {epoch} failed: {source}")]
    Api {
        epoch: Epoch,
        #[source]
        source: ApiError,
    },
}

/// Duties for an epoch could not be loaded. Recoverable kinds are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DutyLoadError {
    #[error("Duty request failed: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Fork(#[from] ForkLookupError),

    #[error("Selection proof signing failed: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Gate(#[from] GateError),

    /// The epoch left the duty window while the load was retrying
    #[error("Duties for epoch {epoch} are no longer needed")]
    NoLongerNeeded { epoch: Epoch },

    #[error("Duty load for epoch {epoch} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        epoch: Epoch,
        attempts: u32,
        last: Box<DutyLoadError>,
    },
}

impl DutyLoadError {
    /// Whether another attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Api(_) | Self::Fork(_) | Self::Gate(_) => true,
            Self::Signer(e) => !matches!(e, SignerError::UnknownKey(_)),
            Self::NoLongerNeeded { .. } | Self::RetriesExhausted { .. } => false,
        }
    }
}

/// A single duty failed. Sibling duties are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DutyExecutionError {
    #[error("Validator API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("Signing failed: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Fork(#[from] ForkLookupError),

    /// The node's assignment places the validator outside its committee
    #[error("Committee position {position} out of range for committee of {size} at slot {slot}")]
    InvalidAssignment {
        slot: Slot,
        position: usize,
        size: usize,
    },

    /// The duty's task ended without producing a result
    #[error("Duty task for slot {slot} aborted")]
    Aborted { slot: Slot },
}

impl DutyExecutionError {
    /// Duty execution is never retried; the slot has moved on.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}
