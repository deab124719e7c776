//! # Inbound Ports
//!
//! What block production asks of the deposit-chain subsystem.

use shared_types::{ChainState, ExternalDataRecord};

/// External-data vote source - inbound port.
pub trait ExternalDataVoteApi: Send + Sync {
    /// Record a proposer building on `state` should vote for.
    fn vote_for(&self, state: &ChainState) -> ExternalDataRecord;
}
