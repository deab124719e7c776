//! # Adapters
//!
//! Port implementations connecting subsystems that do not know each other.
//!
//! - [`LoggedDeposits`]: qc-15 deposit log as qc-17 `DepositProvider`
//! - [`TrackedExternalData`]: qc-15 vote cache as qc-17 `ExternalDataCache`
//! - [`LoggingGossipNetwork`]: qc-05 `GossipNetwork` without a transport
//! - [`InsecureDevSigner`]: qc-18 `DutySigner` for development networks

use async_trait::async_trait;
use parking_lot::Mutex;
use qc_05_attestation_subnets::GossipNetwork;
use qc_15_deposit_chain::{DepositChainProvider, DepositLog, ExternalDataTracker, ExternalDataVoteApi};
use qc_17_block_production::{DepositProvider, ExternalDataCache};
use qc_18_validator_duties::{
    slot_signing_root, AggregateAndProof, DutySigner, ForkInfo, SignerError,
};
use shared_types::{
    keccak256, AttestationData, BlsPublicKey, BlsSignature, CandidateBlock, ChainState, Deposit,
    Epoch, ExternalDataRecord, Hash, HashRoot, RootHasher, Slot, SubnetId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Deposits served straight from the deposit log.
pub struct LoggedDeposits {
    log: Arc<DepositLog>,
    max_deposits: usize,
}

impl LoggedDeposits {
    pub fn new(log: Arc<DepositLog>, max_deposits: usize) -> Self {
        Self { log, max_deposits }
    }
}

#[async_trait]
impl DepositProvider for LoggedDeposits {
    async fn deposits_for(&self, state: &ChainState) -> Vec<Deposit> {
        self.log.deposits_for(state, self.max_deposits)
    }
}

/// External-data votes chosen by the deposit-chain tracker.
pub struct TrackedExternalData<P> {
    tracker: Arc<ExternalDataTracker<P>>,
}

impl<P> TrackedExternalData<P> {
    pub fn new(tracker: Arc<ExternalDataTracker<P>>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl<P: DepositChainProvider + 'static> ExternalDataCache for TrackedExternalData<P> {
    async fn vote_for(&self, state: &ChainState) -> ExternalDataRecord {
        ExternalDataVoteApi::vote_for(self.tracker.as_ref(), state)
    }
}

/// Gossip membership without a transport: records and logs topic changes.
#[derive(Default)]
pub struct LoggingGossipNetwork {
    joined: Mutex<BTreeSet<SubnetId>>,
}

impl LoggingGossipNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subnets currently joined.
    pub fn joined(&self) -> Vec<SubnetId> {
        self.joined.lock().iter().copied().collect()
    }
}

impl GossipNetwork for LoggingGossipNetwork {
    fn subscribe_subnet(&self, subnet: SubnetId) {
        if self.joined.lock().insert(subnet) {
            info!(subnet, "Joined attestation subnet");
        }
    }

    fn unsubscribe_subnet(&self, subnet: SubnetId) {
        if self.joined.lock().remove(&subnet) {
            info!(subnet, "Left attestation subnet");
        }
    }
}

/// Deterministic signer for development networks.
///
/// Signatures are Keccak digests over the key, the signing domain, the fork
/// version and the signed root. They are NOT BLS signatures and offer no
/// security; any node can forge them.
pub struct InsecureDevSigner {
    keys: Vec<BlsPublicKey>,
    slots_per_epoch: u64,
}

impl InsecureDevSigner {
    pub fn new(keys: Vec<BlsPublicKey>, slots_per_epoch: u64) -> Self {
        Self {
            keys,
            slots_per_epoch: slots_per_epoch.max(1),
        }
    }

    fn sign(
        &self,
        pubkey: &BlsPublicKey,
        domain: &[u8],
        fork: &ForkInfo,
        epoch: Epoch,
        root: &Hash,
    ) -> Result<BlsSignature, SignerError> {
        if !self.keys.contains(pubkey) {
            return Err(SignerError::UnknownKey(hex::encode(pubkey)));
        }
        let first = RootHasher::new(b"qc-dev-signature")
            .bytes(pubkey)
            .bytes(domain)
            .bytes(&fork.version_at(epoch))
            .hash(&fork.genesis_validators_root)
            .hash(root)
            .finish();
        let second = keccak256(&first);
        let third = keccak256(&second);

        let mut signature = [0u8; 96];
        signature[..32].copy_from_slice(&first);
        signature[32..64].copy_from_slice(&second);
        signature[64..].copy_from_slice(&third);
        debug!(key = %hex::encode(&pubkey[..4]), domain = %String::from_utf8_lossy(domain), "Signed");
        Ok(signature)
    }

    fn epoch_of(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch
    }
}

#[async_trait]
impl DutySigner for InsecureDevSigner {
    fn public_keys(&self) -> Vec<BlsPublicKey> {
        self.keys.clone()
    }

    async fn sign_randao_reveal(
        &self,
        pubkey: &BlsPublicKey,
        epoch: Epoch,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        let root = RootHasher::new(b"Randao").u64(epoch).finish();
        self.sign(pubkey, b"randao", fork, epoch, &root)
    }

    async fn sign_block(
        &self,
        pubkey: &BlsPublicKey,
        block: &CandidateBlock,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey, b"block", fork, self.epoch_of(block.slot), &block.root())
    }

    async fn sign_attestation_data(
        &self,
        pubkey: &BlsPublicKey,
        data: &AttestationData,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(pubkey, b"attestation", fork, data.target.epoch, &data.hash_root())
    }

    async fn sign_aggregation_slot(
        &self,
        pubkey: &BlsPublicKey,
        slot: Slot,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(
            pubkey,
            b"selection",
            fork,
            self.epoch_of(slot),
            &slot_signing_root(slot),
        )
    }

    async fn sign_aggregate_and_proof(
        &self,
        pubkey: &BlsPublicKey,
        message: &AggregateAndProof,
        fork: &ForkInfo,
    ) -> Result<BlsSignature, SignerError> {
        self.sign(
            pubkey,
            b"aggregate",
            fork,
            self.epoch_of(message.aggregate.data.slot),
            &message.hash_root(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{DepositData, Fork, EMPTY_SIGNATURE};

    fn fork() -> ForkInfo {
        ForkInfo {
            fork: Fork {
                previous_version: [0, 0, 0, 0],
                current_version: [1, 0, 0, 0],
                epoch: 2,
            },
            genesis_validators_root: [7; 32],
        }
    }

    #[tokio::test]
    async fn test_dev_signatures_are_deterministic_and_fork_bound() {
        let key = [1u8; 48];
        let signer = InsecureDevSigner::new(vec![key], 8);

        let a = signer.sign_aggregation_slot(&key, 3, &fork()).await.unwrap();
        let b = signer.sign_aggregation_slot(&key, 3, &fork()).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, EMPTY_SIGNATURE);

        let before = signer.sign_randao_reveal(&key, 1, &fork()).await.unwrap();
        let mut other = fork();
        other.fork.current_version = [9, 0, 0, 0];
        assert_eq!(
            before,
            signer.sign_randao_reveal(&key, 1, &other).await.unwrap()
        );
        // Slot 20 is past the fork epoch.
        assert_ne!(
            signer.sign_aggregation_slot(&key, 20, &fork()).await.unwrap(),
            signer.sign_aggregation_slot(&key, 20, &other).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_key_refused() {
        let signer = InsecureDevSigner::new(vec![[1u8; 48]], 8);
        let err = signer
            .sign_randao_reveal(&[2u8; 48], 0, &fork())
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::UnknownKey(_)));
    }

    #[test]
    fn test_gossip_network_tracks_membership() {
        let network = LoggingGossipNetwork::new();
        network.subscribe_subnet(5);
        network.subscribe_subnet(1);
        network.subscribe_subnet(5);
        network.unsubscribe_subnet(1);
        assert_eq!(network.joined(), vec![5]);
    }

    #[tokio::test]
    async fn test_logged_deposits_skip_processed() {
        let log = Arc::new(DepositLog::new());
        for seed in 0..5u8 {
            log.record(DepositData {
                pubkey: [seed; 48],
                withdrawal_credentials: [seed; 32],
                amount: 32_000_000_000,
                signature: EMPTY_SIGNATURE,
            });
        }
        let provider = LoggedDeposits::new(Arc::clone(&log), 2);
        let state = ChainState {
            deposit_index: 2,
            ..crate::test_support::genesis_state(8)
        };
        let deposits = provider.deposits_for(&state).await;
        assert_eq!(deposits.iter().map(|d| d.index).collect::<Vec<_>>(), vec![2, 3]);
    }
}
