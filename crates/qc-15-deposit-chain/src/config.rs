//! Configuration for deposit chain access

use crate::domain::Address;
use serde::Deserialize;
use shared_types::ConfigError;

/// Runtime configuration for deposit chain access
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DepositChainConfig {
    /// Maximum requests outstanding against the endpoint at once
    pub max_concurrent_requests: usize,

    /// Blocks behind the deposit-chain head before a block may be voted for
    pub follow_distance: u64,

    /// Blocks kept in the external-data cache
    pub max_tracked_blocks: u64,

    /// Deposit contract queried for roots and counts
    pub deposit_contract: Address,
}

impl Default for DepositChainConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            follow_distance: 2048,
            max_tracked_blocks: 1024,
            deposit_contract: [0u8; 20],
        }
    }
}

impl DepositChainConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_requests",
                "must be at least 1",
            ));
        }
        if self.max_tracked_blocks == 0 {
            return Err(ConfigError::invalid("max_tracked_blocks", "must be at least 1"));
        }
        Ok(())
    }
}
