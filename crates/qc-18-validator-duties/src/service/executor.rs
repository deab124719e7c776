//! Execution of individual duties.

use super::fork::ForkProvider;
use crate::domain::{AggregateAndProof, CommitteeAssignment, Duty, DutyKind, SignedAggregateAndProof};
use crate::error::DutyExecutionError;
use crate::metrics;
use crate::ports::{DutySigner, ValidatorApi};
use shared_types::{Attestation, BlsPublicKey, BlsSignature, SignedBlock, Slot, ValidatorIndex};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Outcome of one dispatched duty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DutyReport {
    pub slot: Slot,
    pub validator_index: ValidatorIndex,
    pub kind: DutyKind,
    pub outcome: Result<(), DutyExecutionError>,
}

pub(crate) struct DutyExecutor<A: ValidatorApi, S: DutySigner> {
    api: Arc<A>,
    signer: Arc<S>,
    forks: Arc<ForkProvider<A>>,
    slots_per_epoch: u64,
    attestation_delay: Duration,
    aggregation_delay: Duration,
    reports: mpsc::UnboundedSender<DutyReport>,
}

impl<A, S> DutyExecutor<A, S>
where
    A: ValidatorApi + 'static,
    S: DutySigner + 'static,
{
    pub(crate) fn new(
        api: Arc<A>,
        signer: Arc<S>,
        forks: Arc<ForkProvider<A>>,
        slots_per_epoch: u64,
        attestation_delay: Duration,
        aggregation_delay: Duration,
        reports: mpsc::UnboundedSender<DutyReport>,
    ) -> Self {
        Self {
            api,
            signer,
            forks,
            slots_per_epoch: slots_per_epoch.max(1),
            attestation_delay,
            aggregation_delay,
            reports,
        }
    }

    /// Run each duty in its own task. Returns without waiting.
    ///
    /// Attestation and aggregation delays count from `slot_start`, so a slot
    /// dispatched late only waits for what remains of them.
    pub(crate) fn dispatch(
        self: &Arc<Self>,
        runtime: &Handle,
        duties: Vec<Duty>,
        slot_start: Instant,
    ) {
        for duty in duties {
            let executor = Arc::clone(self);
            let worker_runtime = runtime.clone();
            metrics::record_duty_dispatched(duty.kind().as_str());
            runtime.spawn(async move {
                let slot = duty.slot();
                let validator_index = duty.validator_index();
                let kind = duty.kind();

                // A panicking duty is reported as aborted.
                let worker = Arc::clone(&executor);
                let outcome = match worker_runtime
                    .spawn(async move { worker.execute(duty, slot_start).await })
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DutyExecutionError::Aborted { slot }),
                };

                match &outcome {
                    Ok(()) => info!(
                        slot,
                        validator = validator_index,
                        duty = kind.as_str(),
                        "[qc-18] Duty completed"
                    ),
                    Err(e) => {
                        metrics::record_duty_failed(kind.as_str());
                        warn!(
                            slot,
                            validator = validator_index,
                            duty = kind.as_str(),
                            error = %e,
                            "[qc-18] Duty failed"
                        );
                    }
                }

                let _ = executor.reports.send(DutyReport {
                    slot,
                    validator_index,
                    kind,
                    outcome,
                });
            });
        }
    }

    async fn execute(&self, duty: Duty, slot_start: Instant) -> Result<(), DutyExecutionError> {
        match duty {
            Duty::Proposal { slot, pubkey, .. } => self.propose(slot, &pubkey).await,
            Duty::Attestation {
                slot,
                pubkey,
                committee,
                ..
            } => self.attest(slot, &pubkey, committee, slot_start).await,
            Duty::Aggregation {
                slot,
                validator_index,
                pubkey,
                committee,
                selection_proof,
            } => {
                self.aggregate(
                    slot,
                    validator_index,
                    &pubkey,
                    committee,
                    selection_proof,
                    slot_start,
                )
                .await
            }
        }
    }

    async fn propose(&self, slot: Slot, pubkey: &BlsPublicKey) -> Result<(), DutyExecutionError> {
        let fork = self.forks.fork_for(slot).await?;
        let epoch = slot / self.slots_per_epoch;
        let randao_reveal = self.signer.sign_randao_reveal(pubkey, epoch, &fork).await?;
        let block = self.api.create_unsigned_block(slot, randao_reveal).await?;
        let signature = self.signer.sign_block(pubkey, &block, &fork).await?;
        self.api
            .publish_block(SignedBlock {
                message: block,
                signature,
            })
            .await?;
        Ok(())
    }

    async fn attest(
        &self,
        slot: Slot,
        pubkey: &BlsPublicKey,
        committee: CommitteeAssignment,
        slot_start: Instant,
    ) -> Result<(), DutyExecutionError> {
        tokio::time::sleep_until(slot_start + self.attestation_delay).await;

        let mut aggregation_bits = vec![false; committee.committee_size];
        match aggregation_bits.get_mut(committee.committee_position) {
            Some(bit) => *bit = true,
            None => {
                return Err(DutyExecutionError::InvalidAssignment {
                    slot,
                    position: committee.committee_position,
                    size: committee.committee_size,
                })
            }
        }

        let fork = self.forks.fork_for(slot).await?;
        let data = self
            .api
            .attestation_data(slot, committee.committee_index)
            .await?;
        let signature = self
            .signer
            .sign_attestation_data(pubkey, &data, &fork)
            .await?;
        self.api
            .publish_attestation(Attestation {
                aggregation_bits,
                data,
                signature,
            })
            .await?;
        Ok(())
    }

    async fn aggregate(
        &self,
        slot: Slot,
        aggregator_index: ValidatorIndex,
        pubkey: &BlsPublicKey,
        committee: CommitteeAssignment,
        selection_proof: BlsSignature,
        slot_start: Instant,
    ) -> Result<(), DutyExecutionError> {
        tokio::time::sleep_until(slot_start + self.aggregation_delay).await;

        let fork = self.forks.fork_for(slot).await?;
        let data = self
            .api
            .attestation_data(slot, committee.committee_index)
            .await?;
        let aggregate = self.api.aggregate_attestation(&data).await?;
        let message = AggregateAndProof {
            aggregator_index,
            aggregate,
            selection_proof,
        };
        let signature = self
            .signer
            .sign_aggregate_and_proof(pubkey, &message, &fork)
            .await?;
        self.api
            .publish_aggregate(SignedAggregateAndProof { message, signature })
            .await?;
        Ok(())
    }
}
