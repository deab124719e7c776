//! # Duty Flow
//!
//! The duty orchestrator (qc-18) driven by hand against the node's beacon
//! API, with no slot clock:
//!
//! 1. **Epoch signal**: duties load, aggregators join their subnets (qc-05)
//! 2. **Slot signal**: attestations are signed and pooled, then aggregated
//! 3. **Next slot**: the proposer's block (qc-17) carries them into the
//!    state (qc-04)

#[cfg(test)]
mod tests {
    use node_runtime::{NodeConfig, NodeRuntime};
    use qc_18_validator_duties::{DutyKind, DutyReport, EpochStatus, ValidatorTimingApi};
    use shared_types::Slot;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::UnboundedReceiver;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn node(validators: usize) -> (NodeRuntime, UnboundedReceiver<DutyReport>) {
        let config = NodeConfig {
            validator_count: validators,
            ..NodeConfig::devnet(0)
        };
        let mut node = NodeRuntime::new(config, Handle::current()).unwrap();
        let reports = node.take_reports().unwrap();
        (node, reports)
    }

    /// Reports received so far.
    fn drain(reports: &mut UnboundedReceiver<DutyReport>) -> Vec<DutyReport> {
        let mut out = Vec::new();
        while let Ok(report) = reports.try_recv() {
            out.push(report);
        }
        out
    }

    fn count(reports: &[DutyReport], kind: DutyKind, slot: Slot) -> usize {
        reports
            .iter()
            .filter(|r| r.kind == kind && r.slot == slot && r.outcome.is_ok())
            .count()
    }

    // =============================================================================
    // INTEGRATION TESTS: ORCHESTRATOR → BEACON API
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_epoch_signal_loads_duties_and_joins_subnets() {
        let (node, _reports) = node(16);
        let orchestrator = node.orchestrator();

        orchestrator.on_epoch(0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(orchestrator.epoch_status(0), EpochStatus::Loaded);
        assert_eq!(orchestrator.epoch_status(1), EpochStatus::Loaded);
        let duties = orchestrator.duties(0).unwrap();
        let attestations = duties
            .iter()
            .filter(|d| d.kind() == DutyKind::Attestation)
            .count();
        assert_eq!(attestations, 16);

        // One committee per slot at this size, so every aggregator lands on
        // subnet 0.
        assert_eq!(node.network().joined(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attestations_reach_the_next_block() {
        let (node, mut reports) = node(16);
        let orchestrator = node.orchestrator();

        orchestrator.on_epoch(0);
        orchestrator.on_slot(0);
        // Past the attestation and aggregation points of slot 0.
        tokio::time::sleep(Duration::from_secs(5)).await;

        let slot0 = drain(&mut reports);
        assert_eq!(count(&slot0, DutyKind::Attestation, 0), 2);
        assert_eq!(count(&slot0, DutyKind::Aggregation, 0), 2);
        assert!(slot0.iter().all(|r| r.outcome.is_ok()), "{slot0:?}");

        orchestrator.on_slot(1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let slot1 = drain(&mut reports);
        assert_eq!(count(&slot1, DutyKind::Proposal, 1), 1);
        let head = node.api().head().await;
        assert_eq!(head.block.slot, 1);
        assert!(!head.block.body.attestations.is_empty());
        assert_eq!(head.block.body.attestations[0].data.slot, 0);
        assert!(!head.state.current_epoch_attestations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_before_epoch_load_is_queued() {
        let (node, mut reports) = node(16);
        let orchestrator = node.orchestrator();

        // Slot signal arrives first; its epoch loads on demand.
        orchestrator.on_slot(1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(orchestrator.epoch_status(0), EpochStatus::Loaded);
        assert_eq!(count(&drain(&mut reports), DutyKind::Proposal, 1), 1);
        assert_eq!(node.api().head().await.block.slot, 1);
    }
}
