//! Outbound ports (driven side - SPI)

use crate::domain::{AggregateAndProof, ForkInfo, SignedAggregateAndProof, ValidatorDuties};
use crate::error::{ApiError, SignerError};
use async_trait::async_trait;
use shared_types::{
    Attestation, AttestationData, BlsPublicKey, BlsSignature, CandidateBlock, CommitteeIndex,
    Epoch, SignedBlock, Slot,
};

/// Port: the beacon node's validator API
#[async_trait]
pub trait ValidatorApi: Send + Sync {
    /// Fork context in force for `epoch`.
    async fn fork_info(&self, epoch: Epoch) -> Result<ForkInfo, ApiError>;

    /// Assignments of the given keys for `epoch`. Unknown keys are omitted.
    async fn duties(
        &self,
        epoch: Epoch,
        pubkeys: &[BlsPublicKey],
    ) -> Result<Vec<ValidatorDuties>, ApiError>;

    async fn create_unsigned_block(
        &self,
        slot: Slot,
        randao_reveal: BlsSignature,
    ) -> Result<CandidateBlock, ApiError>;

    async fn publish_block(&self, block: SignedBlock) -> Result<(), ApiError>;

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<AttestationData, ApiError>;

    async fn publish_attestation(&self, attestation: Attestation) -> Result<(), ApiError>;

    /// Best aggregate known for `data`.
    async fn aggregate_attestation(&self, data: &AttestationData)
        -> Result<Attestation, ApiError>;

    async fn publish_aggregate(&self, aggregate: SignedAggregateAndProof) -> Result<(), ApiError>;

    /// Ask the node to join the committee's subnet until `slot` so it can
    /// collect attestations to aggregate.
    async fn subscribe_to_committee(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<(), ApiError>;
}

/// Port: key holder producing signatures for local validators
///
/// Every call receives the fork context of the duty's epoch.
#[async_trait]
pub trait DutySigner: Send + Sync {
    /// Keys this signer can sign for.
    fn public_keys(&self) -> Vec<BlsPublicKey>;

    async fn sign_randao_reveal(
        &self,
        pubkey: &BlsPublicKey,
        epoch: Epoch,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError>;

    async fn sign_block(
        &self,
        pubkey: &BlsPublicKey,
        block: &CandidateBlock,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError>;

    async fn sign_attestation_data(
        &self,
        pubkey: &BlsPublicKey,
        data: &AttestationData,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError>;

    /// Selection proof deciding aggregator election.
    async fn sign_aggregation_slot(
        &self,
        pubkey: &BlsPublicKey,
        slot: Slot,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError>;

    async fn sign_aggregate_and_proof(
        &self,
        pubkey: &BlsPublicKey,
        message: &AggregateAndProof,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError>;
}
