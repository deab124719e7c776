//! # Canonical Hashing
//!
//! Deterministic Keccak-256 roots for every entity. Each type hashes a
//! domain tag followed by its fields in declaration order; lists hash their
//! length followed by each element's root.
//!
//! Two values with equal fields always produce the same root, which is the
//! only property block and state roots rely on.

use crate::entities::*;
use sha3::{Digest, Keccak256};

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental field hasher.
pub struct RootHasher {
    inner: Keccak256,
}

impl RootHasher {
    /// Start a root under a domain tag.
    pub fn new(domain: &[u8]) -> Self {
        let mut inner = Keccak256::new();
        inner.update((domain.len() as u64).to_le_bytes());
        inner.update(domain);
        Self { inner }
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.inner.update([value as u8]);
        self
    }

    pub fn hash(mut self, value: &Hash) -> Self {
        self.inner.update(value);
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.inner.update((value.len() as u64).to_le_bytes());
        self.inner.update(value);
        self
    }

    /// Mix in the root of a nested value.
    pub fn field<T: HashRoot + ?Sized>(self, value: &T) -> Self {
        let root = value.hash_root();
        self.hash(&root)
    }

    pub fn finish(self) -> Hash {
        self.inner.finalize().into()
    }
}

/// Types with a canonical root.
pub trait HashRoot {
    fn hash_root(&self) -> Hash;
}

impl<T: HashRoot> HashRoot for [T] {
    fn hash_root(&self) -> Hash {
        self.iter()
            .fold(RootHasher::new(b"list").u64(self.len() as u64), |h, item| {
                h.field(item)
            })
            .finish()
    }
}

impl<T: HashRoot> HashRoot for Vec<T> {
    fn hash_root(&self) -> Hash {
        self.as_slice().hash_root()
    }
}

impl HashRoot for Hash {
    fn hash_root(&self) -> Hash {
        *self
    }
}

impl HashRoot for u64 {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"u64").u64(*self).finish()
    }
}

impl HashRoot for bool {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"bool").bool(*self).finish()
    }
}

impl HashRoot for Fork {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"Fork")
            .bytes(&self.previous_version)
            .bytes(&self.current_version)
            .u64(self.epoch)
            .finish()
    }
}

impl HashRoot for Checkpoint {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"Checkpoint")
            .u64(self.epoch)
            .hash(&self.root)
            .finish()
    }
}

impl HashRoot for Validator {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"Validator")
            .bytes(&self.pubkey)
            .hash(&self.withdrawal_credentials)
            .u64(self.effective_balance)
            .bool(self.slashed)
            .u64(self.activation_epoch)
            .u64(self.exit_epoch)
            .u64(self.withdrawable_epoch)
            .finish()
    }
}

impl HashRoot for ExternalDataRecord {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"ExternalDataRecord")
            .hash(&self.deposit_root)
            .u64(self.deposit_count)
            .hash(&self.block_hash)
            .finish()
    }
}

impl HashRoot for DepositData {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"DepositData")
            .bytes(&self.pubkey)
            .hash(&self.withdrawal_credentials)
            .u64(self.amount)
            .bytes(&self.signature)
            .finish()
    }
}

impl HashRoot for Deposit {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"Deposit")
            .u64(self.index)
            .field(&self.data)
            .finish()
    }
}

impl HashRoot for AttestationData {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"AttestationData")
            .u64(self.slot)
            .u64(self.index)
            .hash(&self.beacon_block_root)
            .field(&self.source)
            .field(&self.target)
            .finish()
    }
}

impl HashRoot for Attestation {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"Attestation")
            .field(&self.aggregation_bits)
            .field(&self.data)
            .bytes(&self.signature)
            .finish()
    }
}

impl HashRoot for PendingAttestation {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"PendingAttestation")
            .field(&self.aggregation_bits)
            .field(&self.data)
            .u64(self.inclusion_delay)
            .u64(self.proposer_index)
            .finish()
    }
}

impl HashRoot for BlockHeader {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"BlockHeader")
            .u64(self.slot)
            .u64(self.proposer_index)
            .hash(&self.parent_root)
            .hash(&self.state_root)
            .hash(&self.body_root)
            .finish()
    }
}

impl HashRoot for SignedBlockHeader {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"SignedBlockHeader")
            .field(&self.message)
            .bytes(&self.signature)
            .finish()
    }
}

impl HashRoot for ProposerSlashing {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"ProposerSlashing")
            .field(&self.signed_header_1)
            .field(&self.signed_header_2)
            .finish()
    }
}

impl HashRoot for BlockBody {
    fn hash_root(&self) -> Hash {
        RootHasher::new(b"BlockBody")
            .bytes(&self.randao_reveal)
            .field(&self.external_data)
            .hash(&self.graffiti)
            .field(&self.proposer_slashings)
            .field(&self.attestations)
            .field(&self.deposits)
            .finish()
    }
}

impl HashRoot for CandidateBlock {
    fn hash_root(&self) -> Hash {
        self.root()
    }
}

impl HashRoot for ChainState {
    fn hash_root(&self) -> Hash {
        let bits = self.justification_bits;
        RootHasher::new(b"ChainState")
            .u64(self.genesis_time)
            .hash(&self.genesis_validators_root)
            .u64(self.slot)
            .field(&self.fork)
            .field(&self.latest_block_header)
            .field(&self.block_roots)
            .field(&self.randao_mixes)
            .field(&self.external_data)
            .field(&self.external_data_votes)
            .u64(self.deposit_index)
            .field(&self.validators)
            .field(&self.balances)
            .field(&self.previous_epoch_attestations)
            .field(&self.current_epoch_attestations)
            .bool(bits[0])
            .bool(bits[1])
            .bool(bits[2])
            .bool(bits[3])
            .field(&self.previous_justified_checkpoint)
            .field(&self.current_justified_checkpoint)
            .field(&self.finalized_checkpoint)
            .finish()
    }
}
