//! Duty loading with bounded concurrency and retry.

use super::fork::ForkProvider;
use crate::config::RetryPolicy;
use crate::domain::{is_aggregator, CommitteeAssignment, Duty, ScheduledDutySet};
use crate::error::DutyLoadError;
use crate::metrics;
use crate::ports::{DutySigner, ValidatorApi};
use async_trait::async_trait;
use shared_types::{Epoch, ThrottlingRequestGate};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the duty set of one epoch in a single attempt.
#[async_trait]
pub trait DutyLoader: Send + Sync + 'static {
    async fn load(&self, epoch: Epoch) -> Result<ScheduledDutySet, DutyLoadError>;
}

/// Builds duty sets from the node's assignments for the signer's keys.
///
/// Aggregator election is decided here: each attestation assignment gets a
/// selection proof, and elected aggregators have the node join the
/// committee's subnet ahead of the slot.
pub struct ValidatorApiDutyLoader<A: ValidatorApi, S: DutySigner> {
    api: Arc<A>,
    signer: Arc<S>,
    forks: Arc<ForkProvider<A>>,
    slots_per_epoch: u64,
    target_aggregators_per_committee: u64,
}

impl<A: ValidatorApi, S: DutySigner> ValidatorApiDutyLoader<A, S> {
    pub fn new(
        api: Arc<A>,
        signer: Arc<S>,
        forks: Arc<ForkProvider<A>>,
        slots_per_epoch: u64,
        target_aggregators_per_committee: u64,
    ) -> Self {
        Self {
            api,
            signer,
            forks,
            slots_per_epoch: slots_per_epoch.max(1),
            target_aggregators_per_committee,
        }
    }
}

#[async_trait]
impl<A, S> DutyLoader for ValidatorApiDutyLoader<A, S>
where
    A: ValidatorApi + 'static,
    S: DutySigner + 'static,
{
    async fn load(&self, epoch: Epoch) -> Result<ScheduledDutySet, DutyLoadError> {
        let fork = self.forks.fork_for_epoch(epoch).await?;
        let pubkeys = self.signer.public_keys();
        let assignments = self.api.duties(epoch, &pubkeys).await?;
        let in_epoch = |slot: u64| slot / self.slots_per_epoch == epoch;

        let mut duties = Vec::new();
        for assignment in assignments {
            for slot in assignment
                .block_proposal_slots
                .iter()
                .copied()
                .filter(|s| in_epoch(*s))
            {
                duties.push(Duty::Proposal {
                    slot,
                    validator_index: assignment.validator_index,
                    pubkey: assignment.pubkey,
                });
            }

            let slot = assignment.attestation_slot;
            if !in_epoch(slot) {
                warn!(
                    epoch,
                    slot,
                    validator = assignment.validator_index,
                    "[qc-18] Ignoring attestation assignment outside epoch"
                );
                continue;
            }
            let committee = CommitteeAssignment {
                committee_index: assignment.attestation_committee_index,
                committee_position: assignment.attestation_committee_position,
                committee_size: assignment.committee_size,
            };
            duties.push(Duty::Attestation {
                slot,
                validator_index: assignment.validator_index,
                pubkey: assignment.pubkey,
                committee,
            });

            let selection_proof = self
                .signer
                .sign_aggregation_slot(&assignment.pubkey, slot, &fork)
                .await?;
            if is_aggregator(
                &selection_proof,
                committee.committee_size,
                self.target_aggregators_per_committee,
            ) {
                self.api
                    .subscribe_to_committee(slot, committee.committee_index)
                    .await?;
                duties.push(Duty::Aggregation {
                    slot,
                    validator_index: assignment.validator_index,
                    pubkey: assignment.pubkey,
                    committee,
                    selection_proof,
                });
            }
        }

        let set = ScheduledDutySet::new(epoch, fork, duties);
        debug!(epoch, duties = set.len(), "[qc-18] Duty set built");
        Ok(set)
    }
}

/// Runs a loader through a concurrency gate and retries recoverable
/// failures with backoff.
pub struct RetryingDutyLoader<L> {
    loader: Arc<L>,
    gate: ThrottlingRequestGate,
    policy: RetryPolicy,
}

impl<L: DutyLoader> RetryingDutyLoader<L> {
    pub fn new(loader: Arc<L>, max_concurrent_loads: usize, policy: RetryPolicy) -> Self {
        Self {
            loader,
            gate: ThrottlingRequestGate::new("duty-loader", max_concurrent_loads),
            policy,
        }
    }

    /// Load `epoch`, retrying while `still_wanted(epoch)` holds.
    ///
    /// Gives up with `NoLongerNeeded` once the predicate turns false, with
    /// `RetriesExhausted` when the policy caps attempts, or immediately on an
    /// unrecoverable error.
    pub async fn load<F>(
        &self,
        epoch: Epoch,
        still_wanted: F,
    ) -> Result<ScheduledDutySet, DutyLoadError>
    where
        F: Fn(Epoch) -> bool + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            if !still_wanted(epoch) {
                info!(epoch, attempts = attempt, "[qc-18] Duty load abandoned");
                return Err(DutyLoadError::NoLongerNeeded { epoch });
            }
            attempt = attempt.saturating_add(1);

            let loader = Arc::clone(&self.loader);
            let submitted = self.gate.submit(move || async move { loader.load(epoch).await });
            let outcome = match submitted.await {
                Ok(result) => result,
                Err(gate) => Err(gate.into()),
            };

            let error = match outcome {
                Ok(set) => {
                    metrics::record_duty_load("loaded");
                    return Ok(set);
                }
                Err(e) if !e.is_recoverable() => {
                    metrics::record_duty_load("failed");
                    return Err(e);
                }
                Err(e) => e,
            };

            if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                metrics::record_duty_load("exhausted");
                return Err(DutyLoadError::RetriesExhausted {
                    epoch,
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(epoch, attempt);
            warn!(
                epoch,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "[qc-18] Duty load failed, retrying"
            );
            metrics::record_duty_load_retry();
            tokio::time::sleep(delay).await;
        }
    }
}
