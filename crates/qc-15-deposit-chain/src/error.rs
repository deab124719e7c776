//! Error types for deposit chain access

use shared_types::GateError;
use thiserror::Error;

/// Result type alias for deposit chain requests
pub type Result<T> = std::result::Result<T, ExternalRequestError>;

/// Failure of a request against the deposit chain.
///
/// Returned to the caller of the throttled provider as the failed output of
/// its request; the request's in-flight slot is released either way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalRequestError {
    /// Endpoint unreachable or timed out
    #[error("Deposit chain unavailable: {0}")]
    Unavailable(String),

    /// The requested block is not (yet) known to the endpoint
    #[error("Deposit chain block not found: {0}")]
    BlockNotFound(String),

    /// A contract call reverted
    #[error("Contract call failed: {0}")]
    CallFailed(String),

    /// Response could not be decoded
    #[error("Malformed response from deposit chain: {0}")]
    MalformedResponse(String),

    /// The request never reached the endpoint
    #[error(transparent)]
    Gate(#[from] GateError),
}

impl ExternalRequestError {
    /// Whether repeating the request later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::BlockNotFound(_) | Self::Gate(_)
        )
    }
}
