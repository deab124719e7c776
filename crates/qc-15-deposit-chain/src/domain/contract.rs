//! Deposit contract ABI: selectors and response decoding.
//!
//! Both accessors return a single 32-byte ABI word. The count is a `uint256`
//! whose value must fit in 64 bits.

use crate::error::{ExternalRequestError, Result};
use shared_types::{keccak256, Hash};

/// Read accessors of the deposit contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositContractCall {
    DepositRoot,
    DepositCount,
}

impl DepositContractCall {
    pub fn signature(self) -> &'static str {
        match self {
            Self::DepositRoot => "get_deposit_root()",
            Self::DepositCount => "get_deposit_count()",
        }
    }

    /// Call data for this accessor.
    pub fn encode(self) -> Vec<u8> {
        selector(self.signature()).to_vec()
    }

    /// Identify the accessor from call data, if it is one.
    pub fn decode(data: &[u8]) -> Option<Self> {
        [Self::DepositRoot, Self::DepositCount]
            .into_iter()
            .find(|call| data == selector(call.signature()))
    }
}

/// First four bytes of the Keccak-256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn word(response: &[u8]) -> Result<Hash> {
    response.try_into().map_err(|_| {
        ExternalRequestError::MalformedResponse(format!(
            "expected 32-byte word, got {} bytes",
            response.len()
        ))
    })
}

pub fn decode_deposit_root(response: &[u8]) -> Result<Hash> {
    word(response)
}

pub fn decode_deposit_count(response: &[u8]) -> Result<u64> {
    let word = word(response)?;
    let (high, low) = word.split_at(24);
    if high.iter().any(|b| *b != 0) {
        return Err(ExternalRequestError::MalformedResponse(format!(
            "deposit count 0x{} exceeds u64",
            hex::encode(word)
        )));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(low);
    Ok(u64::from_be_bytes(bytes))
}

/// Encode a count the way the contract returns it.
pub fn encode_deposit_count(count: u64) -> Vec<u8> {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&count.to_be_bytes());
    word.to_vec()
}
