//! Tests for duty orchestration

use super::mocks::{MockSigner, MockValidatorApi};
use super::*;
use crate::config::{DutyOrchestratorConfig, RetryPolicy};
use crate::domain::{DutyKind, ScheduledDutySet, ValidatorDuties};
use crate::error::{ApiError, DutyExecutionError, DutyLoadError, ForkLookupError, SignerError};
use crate::ports::ValidatorTimingApi;
use async_trait::async_trait;
use shared_types::{Epoch, ProtocolConstants, Slot};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

fn policy(max_attempts: Option<u32>) -> RetryPolicy {
    RetryPolicy {
        initial_delay_ms: 1_000,
        max_delay_ms: 30_000,
        backoff_multiplier: 2.0,
        jitter: false,
        max_attempts,
    }
}

fn config() -> DutyOrchestratorConfig {
    DutyOrchestratorConfig {
        retry: policy(None),
        ..DutyOrchestratorConfig::default()
    }
}

fn key(byte: u8) -> [u8; 48] {
    [byte; 48]
}

/// Attestation assignment at `slot`; committees of this size always elect
/// the member as aggregator under the minimal preset.
fn assignment(byte: u8, slot: Slot, committee: u64, proposals: Vec<Slot>) -> ValidatorDuties {
    ValidatorDuties {
        pubkey: key(byte),
        validator_index: byte as u64,
        attestation_slot: slot,
        attestation_committee_index: committee,
        attestation_committee_position: 0,
        committee_size: 2,
        block_proposal_slots: proposals,
    }
}

fn orchestrator(
    api: &Arc<MockValidatorApi>,
    keys: &[u8],
) -> (
    DutyOrchestrator<MockValidatorApi, MockSigner>,
    UnboundedReceiver<DutyReport>,
) {
    let signer = Arc::new(MockSigner::new(keys.iter().map(|b| key(*b)).collect()));
    DutyOrchestrator::new(
        Arc::clone(api),
        signer,
        &ProtocolConstants::minimal(),
        config(),
        Handle::current(),
    )
    .unwrap()
}

fn drain(rx: &mut UnboundedReceiver<DutyReport>) -> Vec<DutyReport> {
    let mut reports = Vec::new();
    while let Ok(report) = rx.try_recv() {
        reports.push(report);
    }
    reports.sort_by_key(|r| (r.slot, r.kind, r.validator_index));
    reports
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// =============================================================================
// LOADING & DISPATCH
// =============================================================================

#[tokio::test]
async fn test_epoch_load_and_slot_dispatch() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    api.set_duties(1, vec![assignment(1, 9, 0, vec![10])]);
    let (orchestrator, mut reports) = orchestrator(&api, &[1]);

    orchestrator.on_epoch(1);
    settle().await;
    assert_eq!(orchestrator.epoch_status(1), EpochStatus::Loaded);
    assert_eq!(orchestrator.epoch_status(2), EpochStatus::Loaded);
    assert_eq!(orchestrator.duties(1).unwrap().len(), 3);
    assert_eq!(*api.subscriptions.lock(), vec![(9, 0)]);

    orchestrator.on_slot(9);
    orchestrator.on_slot(10);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let reports = drain(&mut reports);
    let kinds: Vec<_> = reports.iter().map(|r| (r.slot, r.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (9, DutyKind::Attestation),
            (9, DutyKind::Aggregation),
            (10, DutyKind::Proposal)
        ]
    );
    assert!(reports.iter().all(|r| r.outcome.is_ok()));

    let attestations = api.attestations.lock();
    assert_eq!(attestations.len(), 1);
    assert_eq!(attestations[0].aggregation_bits, vec![true, false]);
    assert_eq!(attestations[0].signature, [1; 96]);
    assert_eq!(api.blocks.lock()[0].message.slot, 10);
    assert_eq!(api.aggregates.lock()[0].message.aggregator_index, 1);
}

#[tokio::test]
async fn test_slot_signal_returns_before_duties_complete() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    api.set_duties(1, vec![assignment(1, 9, 0, vec![])]);
    let (orchestrator, mut reports) = orchestrator(&api, &[1]);
    orchestrator.on_epoch(1);
    settle().await;

    orchestrator.on_slot(9);
    assert!(drain(&mut reports).is_empty());
    assert!(api.attestations.lock().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.attestations.lock().len(), 1);
}

#[tokio::test]
async fn test_slots_queue_while_epoch_loading() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    *api.fork_delay.lock() = Duration::from_secs(2);
    api.set_duties(1, vec![assignment(1, 8, 0, vec![])]);
    let (orchestrator, mut reports) = orchestrator(&api, &[1]);

    orchestrator.on_epoch(1);
    orchestrator.on_slot(8);
    assert_eq!(orchestrator.epoch_status(1), EpochStatus::Loading);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(api.attestations.lock().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(orchestrator.epoch_status(1), EpochStatus::Loaded);
    assert_eq!(api.attestations.lock()[0].data.slot, 8);
    assert_eq!(drain(&mut reports).len(), 2);
}

#[tokio::test]
async fn test_queued_slot_keeps_its_start_time() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    *api.fork_delay.lock() = Duration::from_secs(3);
    api.set_duties(1, vec![assignment(1, 8, 0, vec![])]);
    let (orchestrator, _reports) = orchestrator(&api, &[1]);

    orchestrator.on_epoch(1);
    orchestrator.on_slot(8);

    // Loaded after 3s; the attestation still goes out 4s into the slot.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(orchestrator.epoch_status(1), EpochStatus::Loaded);
    assert_eq!(api.attestations.lock().len(), 1);
    assert!(api.aggregates.lock().is_empty());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(api.aggregates.lock().len(), 1);
}

#[tokio::test]
async fn test_first_slot_without_epoch_signal_starts_load() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    api.set_duties(3, vec![assignment(1, 27, 0, vec![])]);
    let (orchestrator, _reports) = orchestrator(&api, &[1]);

    orchestrator.on_slot(27);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(orchestrator.current_epoch(), Some(3));
    assert_eq!(orchestrator.epoch_status(4), EpochStatus::Loaded);
    assert_eq!(api.attestations.lock().len(), 1);
}

// =============================================================================
// RETRY
// =============================================================================

#[tokio::test]
async fn test_failed_load_retries_without_blocking_loaded_epoch() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    api.set_duties(1, vec![assignment(1, 15, 0, vec![])]);
    api.set_duties(2, vec![assignment(1, 16, 0, vec![])]);
    api.fail_duties(2, 2);
    let (orchestrator, mut reports) = orchestrator(&api, &[1]);

    orchestrator.on_epoch(1);
    settle().await;
    assert_eq!(orchestrator.epoch_status(1), EpochStatus::Loaded);
    assert_eq!(orchestrator.epoch_status(2), EpochStatus::Loading);

    // Epoch 1 keeps dispatching while epoch 2 retries.
    orchestrator.on_slot(15);
    tokio::time::sleep(Duration::from_secs(10)).await;
    let slot_15 = drain(&mut reports);
    assert_eq!(slot_15.len(), 2);
    assert!(slot_15.iter().all(|r| r.slot == 15 && r.outcome.is_ok()));

    // Backoff of 1s then 2s: loaded on the third attempt.
    assert_eq!(api.duty_calls(2), 3);
    assert_eq!(orchestrator.epoch_status(2), EpochStatus::Loaded);

    orchestrator.on_epoch(2);
    orchestrator.on_slot(16);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(drain(&mut reports).len(), 2);
}

#[tokio::test]
async fn test_load_leaving_window_stops_retrying() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    api.fail_duties(2, u32::MAX);
    let (orchestrator, _reports) = orchestrator(&api, &[1]);

    orchestrator.on_epoch(1);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(orchestrator.epoch_status(2), EpochStatus::Loading);
    assert!(api.duty_calls(2) > 1);

    orchestrator.on_epoch(5);
    tokio::time::sleep(Duration::from_secs(60)).await;
    let calls = api.duty_calls(2);
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(api.duty_calls(2), calls);
    assert_eq!(orchestrator.epoch_status(2), EpochStatus::Unloaded);
    assert_eq!(orchestrator.epoch_status(5), EpochStatus::Loaded);
}

struct ScriptedLoader {
    calls: AtomicU32,
    error: DutyLoadError,
}

#[async_trait]
impl DutyLoader for ScriptedLoader {
    async fn load(&self, _epoch: Epoch) -> Result<ScheduledDutySet, DutyLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

fn scripted(error: DutyLoadError) -> Arc<ScriptedLoader> {
    Arc::new(ScriptedLoader {
        calls: AtomicU32::new(0),
        error,
    })
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    tokio::time::pause();
    let loader = scripted(DutyLoadError::Api(ApiError::Unavailable("down".into())));
    let retrying = RetryingDutyLoader::new(Arc::clone(&loader), 1, policy(Some(3)));

    let err = retrying.load(4, |_| true).await.unwrap_err();
    assert!(matches!(
        err,
        DutyLoadError::RetriesExhausted {
            epoch: 4,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unrecoverable_error_not_retried() {
    tokio::time::pause();
    let loader = scripted(DutyLoadError::Signer(SignerError::UnknownKey("aa".into())));
    let retrying = RetryingDutyLoader::new(Arc::clone(&loader), 1, policy(None));

    let err = retrying.load(4, |_| true).await.unwrap_err();
    assert!(matches!(err, DutyLoadError::Signer(_)));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// EXECUTION
// =============================================================================

#[tokio::test]
async fn test_duty_failure_does_not_abort_siblings() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    api.set_duties(1, vec![assignment(1, 9, 0, vec![]), assignment(2, 9, 1, vec![])]);
    api.fail_committee(1);
    let (orchestrator, mut reports) = orchestrator(&api, &[1, 2]);

    orchestrator.on_epoch(1);
    settle().await;
    orchestrator.on_slot(9);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let reports = drain(&mut reports);
    assert_eq!(reports.len(), 4);
    for report in &reports {
        if report.validator_index == 2 {
            assert!(matches!(report.outcome, Err(DutyExecutionError::Api(_))));
        } else {
            assert!(report.outcome.is_ok());
        }
    }
    assert_eq!(api.attestations.lock().len(), 1);
    assert_eq!(api.aggregates.lock().len(), 1);
}

#[tokio::test]
async fn test_invalid_committee_position_reported() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    let mut bad = assignment(1, 9, 0, vec![]);
    bad.attestation_committee_position = 5;
    api.set_duties(1, vec![bad]);
    let (orchestrator, mut reports) = orchestrator(&api, &[1]);

    orchestrator.on_epoch(1);
    settle().await;
    orchestrator.on_slot(9);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let attestation = drain(&mut reports)
        .into_iter()
        .find(|r| r.kind == DutyKind::Attestation)
        .unwrap();
    assert_eq!(
        attestation.outcome,
        Err(DutyExecutionError::InvalidAssignment {
            slot: 9,
            position: 5,
            size: 2
        })
    );
}

// =============================================================================
// FORK PROVIDER
// =============================================================================

#[tokio::test]
async fn test_concurrent_fork_lookups_share_one_request() {
    tokio::time::pause();
    let api = Arc::new(MockValidatorApi::new());
    *api.fork_delay.lock() = Duration::from_secs(1);
    let forks = ForkProvider::new(Arc::clone(&api), 8);

    let (a, b, c) = tokio::join!(forks.fork_for(8), forks.fork_for(15), forks.fork_for_epoch(1));
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(api.fork_calls.load(Ordering::SeqCst), 1);

    forks.fork_for(9).await.unwrap();
    assert_eq!(api.fork_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fork_failure_not_cached() {
    let api = Arc::new(MockValidatorApi::new());
    api.fork_failures.store(1, Ordering::SeqCst);
    let forks = ForkProvider::new(Arc::clone(&api), 8);

    let err = forks.fork_for_epoch(3).await.unwrap_err();
    assert!(matches!(err, ForkLookupError::Api { epoch: 3, .. }));
    assert!(forks.fork_for_epoch(3).await.is_ok());
    assert_eq!(api.fork_calls.load(Ordering::SeqCst), 2);

    forks.fork_for_epoch(4).await.unwrap();
    forks.prune(4);
    assert_eq!(forks.cached_epochs(), 1);
}
