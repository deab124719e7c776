//! Deposit chain domain: blocks, contract calls and the deposit log.

mod contract;
mod deposit_log;

pub use contract::{
    decode_deposit_count, decode_deposit_root, encode_deposit_count, selector, DepositContractCall,
};
pub use deposit_log::DepositLog;

use serde::{Deserialize, Serialize};
use shared_types::Hash;

/// Account address on the deposit chain.
pub type Address = [u8; 20];

/// Header fields of a deposit-chain block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositChainBlock {
    pub number: u64,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub timestamp: u64,
}

/// Read-only contract call evaluated at a given block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Vec<u8>,
    pub block_number: u64,
}
