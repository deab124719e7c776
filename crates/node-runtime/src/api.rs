//! # Beacon Node API
//!
//! Node-side implementation of the validator API. The chain head lives
//! behind one async mutex: duty computation, block creation and block import
//! each see a single consistent head, and imports are serialized.

use async_trait::async_trait;
use qc_04_state_transition::{StateTransitionEngine, StateTransitionError};
use qc_05_attestation_subnets::SubnetSubscriptionApi;
use qc_17_block_production::{
    BlockAssembler, BlockAssemblyApi, InMemoryAttestationPool, InMemorySlashingPool,
};
use qc_18_validator_duties::{
    ApiError, ForkInfo, SignedAggregateAndProof, ValidatorApi, ValidatorDuties,
};
use quantum_telemetry::{
    time_histogram, BLOCKS_IMPORTED, BLOCK_IMPORT_DURATION, FINALIZED_EPOCH, HEAD_SLOT,
    JUSTIFIED_EPOCH, SUBSYSTEM_ERRORS,
};
use shared_bus::{ChainEvent, EventPublisher};
use shared_types::{
    Attestation, AttestationData, BlsPublicKey, BlsSignature, CandidateBlock, ChainState,
    Checkpoint, CommitteeIndex, Epoch, Hash, ProtocolConstants, SignedBlock, Slot,
    EMPTY_SIGNATURE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Head block and its post-state.
#[derive(Clone, Debug)]
pub struct ChainHead {
    pub state: ChainState,
    pub block: CandidateBlock,
}

impl ChainHead {
    pub fn root(&self) -> Hash {
        self.block.root()
    }
}

/// Count a transition failure and turn it into an API rejection.
fn rejected(subsystem: &str, error: StateTransitionError) -> ApiError {
    SUBSYSTEM_ERRORS
        .with_label_values(&[subsystem, error.kind()])
        .inc();
    ApiError::Rejected(error.to_string())
}

/// Beacon node serving local validators.
pub struct BeaconNodeApi {
    engine: Arc<StateTransitionEngine>,
    assembler: BlockAssembler,
    attestations: Arc<InMemoryAttestationPool>,
    slashings: Arc<InMemorySlashingPool>,
    subnets: Arc<dyn SubnetSubscriptionApi>,
    events: Arc<dyn EventPublisher>,
    head: Mutex<ChainHead>,
}

impl BeaconNodeApi {
    pub fn new(
        engine: Arc<StateTransitionEngine>,
        assembler: BlockAssembler,
        attestations: Arc<InMemoryAttestationPool>,
        slashings: Arc<InMemorySlashingPool>,
        subnets: Arc<dyn SubnetSubscriptionApi>,
        events: Arc<dyn EventPublisher>,
        genesis: ChainHead,
    ) -> Self {
        HEAD_SLOT.set(genesis.block.slot as i64);
        Self {
            engine,
            assembler,
            attestations,
            slashings,
            subnets,
            events,
            head: Mutex::new(genesis),
        }
    }

    fn constants(&self) -> &ProtocolConstants {
        self.engine.constants()
    }

    /// Snapshot of the current head.
    pub async fn head(&self) -> ChainHead {
        self.head.lock().await.clone()
    }

    /// Head state advanced to `slot`, or the head state itself if it is
    /// already there or beyond.
    fn state_at(&self, head: &ChainHead, slot: Slot) -> Result<ChainState, ApiError> {
        if slot <= head.state.slot {
            return Ok(head.state.clone());
        }
        self.engine
            .advance(&head.state, slot)
            .map_err(|e| rejected("qc-04", e))
    }

    /// Compute assignments of `pubkeys` for `epoch` from `state`.
    fn assignments(
        &self,
        state: &ChainState,
        epoch: Epoch,
        pubkeys: &[BlsPublicKey],
    ) -> Result<Vec<ValidatorDuties>, ApiError> {
        let c = self.constants();
        let wanted: HashMap<u64, BlsPublicKey> = pubkeys
            .iter()
            .filter_map(|pk| state.validator_index(pk).map(|index| (index, *pk)))
            .collect();

        let committees = self
            .engine
            .committees(state, epoch)
            .map_err(|e| rejected("qc-04", e))?;

        let start = c.epoch_start_slot(epoch);
        let mut proposals: HashMap<u64, Vec<Slot>> = HashMap::new();
        // Slot 0 belongs to the genesis block.
        for slot in start.max(1)..start + c.slots_per_epoch {
            let proposer = self
                .engine
                .proposer_index(state, slot)
                .map_err(|e| rejected("qc-04", e))?;
            if wanted.contains_key(&proposer) {
                proposals.entry(proposer).or_default().push(slot);
            }
        }

        let mut duties = Vec::new();
        for (slot, committee_index, members) in committees.iter() {
            for (position, validator_index) in members.iter().enumerate() {
                let Some(pubkey) = wanted.get(validator_index) else {
                    continue;
                };
                duties.push(ValidatorDuties {
                    pubkey: *pubkey,
                    validator_index: *validator_index,
                    attestation_slot: slot,
                    attestation_committee_index: committee_index,
                    attestation_committee_position: position,
                    committee_size: members.len(),
                    block_proposal_slots: proposals.remove(validator_index).unwrap_or_default(),
                });
            }
        }
        duties.sort_by_key(|d| d.validator_index);
        Ok(duties)
    }

    async fn import(&self, block: CandidateBlock) -> Result<(), ApiError> {
        let timer = time_histogram!(BLOCK_IMPORT_DURATION);
        let mut head = self.head.lock().await;
        let state = self
            .engine
            .import_block(&head.state, &block)
            .map_err(|e| rejected("qc-04", e))?;

        let previous_justified = head.state.current_justified_checkpoint;
        let previous_finalized = head.state.finalized_checkpoint;
        let justified = state.current_justified_checkpoint;
        let finalized = state.finalized_checkpoint;
        *head = ChainHead {
            state,
            block: block.clone(),
        };
        drop(head);
        drop(timer);

        self.attestations.on_block_imported(&block);
        self.slashings.on_block_imported(&block);

        let root = block.root();
        BLOCKS_IMPORTED.inc();
        HEAD_SLOT.set(block.slot as i64);
        JUSTIFIED_EPOCH.set(justified.epoch as i64);
        FINALIZED_EPOCH.set(finalized.epoch as i64);
        info!(
            slot = block.slot,
            proposer = block.proposer_index,
            root = %hex::encode(&root[..8]),
            attestations = block.body.attestations.len(),
            deposits = block.body.deposits.len(),
            "Block imported"
        );
        if justified.epoch > previous_justified.epoch {
            debug!(epoch = justified.epoch, "Justified checkpoint advanced");
        }

        self.events
            .publish(ChainEvent::BlockImported {
                slot: block.slot,
                root,
                proposer_index: block.proposer_index,
            })
            .await;
        if finalized.epoch > previous_finalized.epoch {
            self.events
                .publish(ChainEvent::CheckpointFinalized(finalized))
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl ValidatorApi for BeaconNodeApi {
    async fn fork_info(&self, _epoch: Epoch) -> Result<ForkInfo, ApiError> {
        let head = self.head.lock().await;
        Ok(ForkInfo {
            fork: head.state.fork,
            genesis_validators_root: head.state.genesis_validators_root,
        })
    }

    async fn duties(
        &self,
        epoch: Epoch,
        pubkeys: &[BlsPublicKey],
    ) -> Result<Vec<ValidatorDuties>, ApiError> {
        let head = self.head.lock().await;
        let start = self.constants().epoch_start_slot(epoch);
        let state = self.state_at(&head, start)?;
        drop(head);

        let duties = self.assignments(&state, epoch, pubkeys)?;
        debug!(epoch, requested = pubkeys.len(), assigned = duties.len(), "Duties computed");
        Ok(duties)
    }

    async fn create_unsigned_block(
        &self,
        slot: Slot,
        randao_reveal: BlsSignature,
    ) -> Result<CandidateBlock, ApiError> {
        let head = self.head.lock().await;
        if slot <= head.block.slot {
            return Err(ApiError::Rejected(format!(
                "slot {slot} is not after head slot {}",
                head.block.slot
            )));
        }
        self.assembler
            .create_unsigned_block(&head.state, &head.block, slot, randao_reveal)
            .await
            .map_err(|e| rejected("qc-17", e))
    }

    async fn publish_block(&self, block: SignedBlock) -> Result<(), ApiError> {
        if block.signature == EMPTY_SIGNATURE {
            return Err(ApiError::Rejected("block is unsigned".into()));
        }
        self.import(block.message).await
    }

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<AttestationData, ApiError> {
        let c = self.constants();
        let head = self.head.lock().await;
        let state = self.state_at(&head, slot)?;
        drop(head);

        let epoch = c.epoch_at_slot(slot);
        let committees = self
            .engine
            .committees(&state, epoch)
            .map_err(|e| rejected("qc-04", e))?;
        if committees.committee(slot, committee_index).is_none() {
            return Err(ApiError::Rejected(format!(
                "no committee {committee_index} at slot {slot}"
            )));
        }

        let unknown = |at: Slot| ApiError::Rejected(format!("no block root known at slot {at}"));
        let beacon_block_root = self
            .engine
            .block_root_at(&state, slot)
            .ok_or_else(|| unknown(slot))?;
        let target_slot = c.epoch_start_slot(epoch);
        let target_root = self
            .engine
            .block_root_at(&state, target_slot)
            .ok_or_else(|| unknown(target_slot))?;
        let source = if state.current_epoch(c) == epoch {
            state.current_justified_checkpoint
        } else {
            state.previous_justified_checkpoint
        };

        Ok(AttestationData {
            slot,
            index: committee_index,
            beacon_block_root,
            source,
            target: Checkpoint::new(epoch, target_root),
        })
    }

    async fn publish_attestation(&self, attestation: Attestation) -> Result<(), ApiError> {
        if !self.attestations.add(attestation) {
            debug!("Redundant attestation ignored");
        }
        Ok(())
    }

    async fn aggregate_attestation(
        &self,
        data: &AttestationData,
    ) -> Result<Attestation, ApiError> {
        self.attestations.best_for(data).ok_or_else(|| {
            ApiError::Rejected(format!(
                "no attestations for slot {} committee {}",
                data.slot, data.index
            ))
        })
    }

    async fn publish_aggregate(&self, aggregate: SignedAggregateAndProof) -> Result<(), ApiError> {
        let message = aggregate.message;
        debug!(
            aggregator = message.aggregator_index,
            slot = message.aggregate.data.slot,
            participants = message.aggregate.participant_count(),
            "Aggregate received"
        );
        self.attestations.add(message.aggregate);
        Ok(())
    }

    async fn subscribe_to_committee(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<(), ApiError> {
        let subnet = self.subnets.subscribe(committee_index, slot);
        debug!(slot, committee_index, subnet, "Committee subnet requested");
        Ok(())
    }
}

impl std::fmt::Debug for BeaconNodeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconNodeApi").finish_non_exhaustive()
    }
}
