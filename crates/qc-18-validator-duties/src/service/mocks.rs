//! Test doubles for the validator API and signer.

use crate::domain::{AggregateAndProof, ForkInfo, SignedAggregateAndProof, ValidatorDuties};
use crate::error::{ApiError, SignerError};
use crate::ports::{DutySigner, ValidatorApi};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    Attestation, AttestationData, BlsPublicKey, BlsSignature, CandidateBlock, CommitteeIndex,
    Epoch, Fork, SignedBlock, Slot, ZERO_HASH,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Scriptable validator API recording everything published through it.
#[derive(Default)]
pub(super) struct MockValidatorApi {
    pub fork_calls: AtomicU32,
    /// Fork lookups still to fail
    pub fork_failures: AtomicU32,
    pub fork_delay: Mutex<Duration>,
    duties: Mutex<HashMap<Epoch, Vec<ValidatorDuties>>>,
    /// Duty requests still to fail, per epoch
    duty_failures: Mutex<HashMap<Epoch, u32>>,
    duty_calls: Mutex<HashMap<Epoch, u32>>,
    failing_committees: Mutex<HashSet<CommitteeIndex>>,
    pub blocks: Mutex<Vec<SignedBlock>>,
    pub attestations: Mutex<Vec<Attestation>>,
    pub aggregates: Mutex<Vec<SignedAggregateAndProof>>,
    pub subscriptions: Mutex<Vec<(Slot, CommitteeIndex)>>,
}

impl MockValidatorApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_duties(&self, epoch: Epoch, duties: Vec<ValidatorDuties>) {
        self.duties.lock().insert(epoch, duties);
    }

    pub fn fail_duties(&self, epoch: Epoch, times: u32) {
        self.duty_failures.lock().insert(epoch, times);
    }

    pub fn fail_committee(&self, index: CommitteeIndex) {
        self.failing_committees.lock().insert(index);
    }

    pub fn duty_calls(&self, epoch: Epoch) -> u32 {
        self.duty_calls.lock().get(&epoch).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ValidatorApi for MockValidatorApi {
    async fn fork_info(&self, _epoch: Epoch) -> Result<ForkInfo, ApiError> {
        self.fork_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fork_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fork_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ApiError::Unavailable("fork lookup".into()));
        }
        Ok(ForkInfo {
            fork: Fork::default(),
            genesis_validators_root: [0x11; 32],
        })
    }

    async fn duties(
        &self,
        epoch: Epoch,
        pubkeys: &[BlsPublicKey],
    ) -> Result<Vec<ValidatorDuties>, ApiError> {
        *self.duty_calls.lock().entry(epoch).or_default() += 1;
        if let Some(remaining) = self.duty_failures.lock().get_mut(&epoch) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApiError::Unavailable("node syncing".into()));
            }
        }
        Ok(self
            .duties
            .lock()
            .get(&epoch)
            .map(|all| {
                all.iter()
                    .filter(|d| pubkeys.contains(&d.pubkey))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_unsigned_block(
        &self,
        slot: Slot,
        _randao_reveal: BlsSignature,
    ) -> Result<CandidateBlock, ApiError> {
        let mut block = CandidateBlock::genesis(ZERO_HASH);
        block.slot = slot;
        Ok(block)
    }

    async fn publish_block(&self, block: SignedBlock) -> Result<(), ApiError> {
        self.blocks.lock().push(block);
        Ok(())
    }

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<AttestationData, ApiError> {
        if self.failing_committees.lock().contains(&committee_index) {
            return Err(ApiError::Rejected(format!("committee {committee_index}")));
        }
        Ok(AttestationData {
            slot,
            index: committee_index,
            ..AttestationData::default()
        })
    }

    async fn publish_attestation(&self, attestation: Attestation) -> Result<(), ApiError> {
        self.attestations.lock().push(attestation);
        Ok(())
    }

    async fn aggregate_attestation(
        &self,
        data: &AttestationData,
    ) -> Result<Attestation, ApiError> {
        Ok(Attestation {
            aggregation_bits: vec![true, true],
            data: *data,
            signature: [9; 96],
        })
    }

    async fn publish_aggregate(&self, aggregate: SignedAggregateAndProof) -> Result<(), ApiError> {
        self.aggregates.lock().push(aggregate);
        Ok(())
    }

    async fn subscribe_to_committee(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<(), ApiError> {
        self.subscriptions.lock().push((slot, committee_index));
        Ok(())
    }
}

/// Signer whose signatures repeat the key's first byte.
pub(super) struct MockSigner {
    keys: Vec<BlsPublicKey>,
}

impl MockSigner {
    pub fn new(keys: Vec<BlsPublicKey>) -> Self {
        Self { keys }
    }

    fn sign(&self, pubkey: &BlsPublicKey) -> Result<BlsSignature, SignerError> {
        if self.keys.contains(pubkey) {
            Ok([pubkey[0]; 96])
        } else {
            Err(SignerError::UnknownKey(hex::encode(pubkey)))
        }
    }
}

#[async_trait]
impl DutySigner for MockSigner {
    fn public_keys(&self) -> Vec<BlsPublicKey> {
        self.keys.clone()
    }

    async fn sign_randao_reveal(
        &self,
        pubkey: &BlsPublicKey,
        _epoch: Epoch,
        _fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey)
    }

    async fn sign_block(
        &self,
        pubkey: &BlsPublicKey,
        _block: &CandidateBlock,
        _fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey)
    }

    async fn sign_attestation_data(
        &self,
        pubkey: &BlsPublicKey,
        _data: &AttestationData,
        _fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey)
    }

    async fn sign_aggregation_slot(
        &self,
        pubkey: &BlsPublicKey,
        _slot: Slot,
        _fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey)
    }

    async fn sign_aggregate_and_proof(
        &self,
        pubkey: &BlsPublicKey,
        _message: &AggregateAndProof,
        _fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey)
    }
}
