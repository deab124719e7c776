//! # Event Wiring
//!
//! Each subsystem that follows the timeline gets its own bus subscription
//! and its own task. The slot clock never waits on a handler: a slow handler
//! lags on its own subscription and skips events.
//!
//! ```text
//!                     SlotClock
//!                         │ EpochStarted / SlotStarted
//!                         ▼
//!                  InMemoryEventBus ◄──── BlockImported / CheckpointFinalized
//!                         │                        (BeaconNodeApi)
//!        ┌────────────────┼─────────────────┬─────────────────┐
//!        ▼                ▼                 ▼                 ▼
//!   DutyTiming     SubnetExpiry     DepositChainSync    ChainEventLog
//!    (qc-18)      (qc-05, qc-17)        (qc-15)
//! ```

use async_trait::async_trait;
use qc_05_attestation_subnets::SubnetSubscriptionApi;
use qc_15_deposit_chain::{DepositChainProvider, ExternalDataTracker, InMemoryDepositChain};
use qc_17_block_production::InMemoryAttestationPool;
use qc_18_validator_duties::ValidatorTimingApi;
use quantum_telemetry::{log_slot_event, SUBSYSTEM_ERRORS};
use shared_bus::{ChainEvent, EventFilter, EventTopic, Subscription};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Consumer of bus events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Events this handler wants.
    fn filter(&self) -> EventFilter;

    async fn handle(&self, event: ChainEvent);
}

/// Feed `subscription` to `handler` until the bus closes or shutdown is
/// signalled.
pub async fn run_handler<H: EventHandler + ?Sized>(
    handler: &H,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => handler.handle(event).await,
                None => {
                    info!(handler = handler.name(), "Event bus closed");
                    return;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(
                        handler = handler.name(),
                        lagged = subscription.lagged(),
                        "Shutdown signal received"
                    );
                    return;
                }
            }
        }
    }
}

/// Routes the timeline into the duty orchestrator.
pub struct DutyTiming<T> {
    timing: Arc<T>,
}

impl<T> DutyTiming<T> {
    pub fn new(timing: Arc<T>) -> Self {
        Self { timing }
    }
}

#[async_trait]
impl<T: ValidatorTimingApi + 'static> EventHandler for DutyTiming<T> {
    fn name(&self) -> &'static str {
        "duty-timing"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::topics(vec![EventTopic::Clock])
    }

    async fn handle(&self, event: ChainEvent) {
        match event {
            ChainEvent::EpochStarted { epoch } => self.timing.on_epoch(epoch),
            ChainEvent::SlotStarted { slot } => self.timing.on_slot(slot),
            _ => {}
        }
    }
}

/// Expires subnet subscriptions and stale pooled attestations every slot.
pub struct SubnetExpiry {
    subnets: Arc<dyn SubnetSubscriptionApi>,
    attestations: Arc<InMemoryAttestationPool>,
}

impl SubnetExpiry {
    pub fn new(
        subnets: Arc<dyn SubnetSubscriptionApi>,
        attestations: Arc<InMemoryAttestationPool>,
    ) -> Self {
        Self {
            subnets,
            attestations,
        }
    }
}

#[async_trait]
impl EventHandler for SubnetExpiry {
    fn name(&self) -> &'static str {
        "subnet-expiry"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::topics(vec![EventTopic::Clock])
    }

    async fn handle(&self, event: ChainEvent) {
        if let ChainEvent::SlotStarted { slot } = event {
            let left = self.subnets.on_slot(slot);
            if !left.is_empty() {
                debug!(slot, subnets = ?left, "Subnet subscriptions expired");
            }
            self.attestations.prune(slot);
        }
    }
}

/// Follows the deposit chain once per slot.
///
/// With a development chain attached, a block is mined first so the chain
/// keeps moving.
pub struct DepositChainSync<P> {
    tracker: Arc<ExternalDataTracker<P>>,
    dev_chain: Option<Arc<InMemoryDepositChain>>,
}

impl<P> DepositChainSync<P> {
    pub fn new(
        tracker: Arc<ExternalDataTracker<P>>,
        dev_chain: Option<Arc<InMemoryDepositChain>>,
    ) -> Self {
        Self { tracker, dev_chain }
    }
}

#[async_trait]
impl<P: DepositChainProvider + 'static> EventHandler for DepositChainSync<P> {
    fn name(&self) -> &'static str {
        "deposit-chain-sync"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::topics(vec![EventTopic::Clock])
    }

    async fn handle(&self, event: ChainEvent) {
        let ChainEvent::SlotStarted { slot } = event else {
            return;
        };
        if let Some(chain) = &self.dev_chain {
            chain.mine_block();
        }
        match self.tracker.sync().await {
            Ok(added) => debug!(slot, added, "Deposit chain followed"),
            Err(e) => {
                SUBSYSTEM_ERRORS
                    .with_label_values(&["qc-15", "sync"])
                    .inc();
                log_slot_event!(
                    warn,
                    "qc-15",
                    "Deposit chain sync failed",
                    slot,
                    error = %e,
                    recoverable = e.is_recoverable()
                );
            }
        }
    }
}

/// Logs head and finality changes.
#[derive(Default)]
pub struct ChainEventLog;

#[async_trait]
impl EventHandler for ChainEventLog {
    fn name(&self) -> &'static str {
        "chain-event-log"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::topics(vec![EventTopic::Chain])
    }

    async fn handle(&self, event: ChainEvent) {
        match event {
            ChainEvent::BlockImported {
                slot,
                root,
                proposer_index,
            } => debug!(
                slot,
                proposer = proposer_index,
                root = %hex::encode(&root[..8]),
                "Head updated"
            ),
            ChainEvent::CheckpointFinalized(checkpoint) => info!(
                epoch = checkpoint.epoch,
                root = %hex::encode(&checkpoint.root[..8]),
                "Checkpoint finalized"
            ),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shared_bus::{EventPublisher, InMemoryEventBus};
    use shared_types::{Epoch, Slot};

    #[derive(Default)]
    struct RecordingTiming {
        calls: Mutex<Vec<String>>,
    }

    impl ValidatorTimingApi for RecordingTiming {
        fn on_epoch(&self, epoch: Epoch) {
            self.calls.lock().push(format!("epoch {epoch}"));
        }

        fn on_slot(&self, slot: Slot) {
            self.calls.lock().push(format!("slot {slot}"));
        }
    }

    #[tokio::test]
    async fn test_duty_timing_receives_clock_events_in_order() {
        let bus = InMemoryEventBus::new();
        let timing = Arc::new(RecordingTiming::default());
        let handler = DutyTiming::new(Arc::clone(&timing));
        let subscription = bus.subscribe(handler.filter());
        let (stop_tx, stop_rx) = watch::channel(false);

        bus.publish(ChainEvent::EpochStarted { epoch: 2 }).await;
        bus.publish(ChainEvent::SlotStarted { slot: 16 }).await;
        bus.publish(ChainEvent::BlockImported {
            slot: 16,
            root: [0; 32],
            proposer_index: 1,
        })
        .await;
        bus.publish(ChainEvent::SlotStarted { slot: 17 }).await;
        drop(bus);

        run_handler(&handler, subscription, stop_rx).await;
        drop(stop_tx);
        assert_eq!(
            *timing.calls.lock(),
            vec!["epoch 2", "slot 16", "slot 17"]
        );
    }

    #[tokio::test]
    async fn test_handler_stops_on_shutdown() {
        let bus = InMemoryEventBus::new();
        let handler = ChainEventLog;
        let subscription = bus.subscribe(handler.filter());
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move { run_handler(&handler, subscription, stop_rx).await });
        stop_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
