//! # Slot Clock
//!
//! Turns wall-clock time into the slot/epoch timeline published on the bus.
//! `EpochStarted` always precedes the `SlotStarted` of the epoch's first
//! slot; the first slot seen after startup also gets an `EpochStarted` so
//! subscribers learn the current epoch without waiting for a boundary.

use quantum_telemetry::{log_slot_event, CLOCK_EVENTS};
use shared_bus::{ChainEvent, EventPublisher};
use shared_types::{Epoch, Slot};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotClock {
    genesis_time: u64,
    seconds_per_slot: u64,
    slots_per_epoch: u64,
}

impl SlotClock {
    pub fn new(genesis_time: u64, seconds_per_slot: u64, slots_per_epoch: u64) -> Self {
        Self {
            genesis_time,
            seconds_per_slot: seconds_per_slot.max(1),
            slots_per_epoch: slots_per_epoch.max(1),
        }
    }

    /// Slot in progress at `unix_time`, `None` before genesis.
    pub fn slot_at(&self, unix_time: u64) -> Option<Slot> {
        unix_time
            .checked_sub(self.genesis_time)
            .map(|elapsed| elapsed / self.seconds_per_slot)
    }

    /// Unix time at which `slot` starts.
    pub fn slot_start(&self, slot: Slot) -> u64 {
        self.genesis_time
            .saturating_add(slot.saturating_mul(self.seconds_per_slot))
    }

    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch
    }

    /// Current Unix time in seconds.
    pub fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Publish the timeline until `shutdown` flips or its sender is dropped.
    ///
    /// `now` is the Unix time corresponding to the moment of the call; slot
    /// deadlines are measured from there on the tokio clock.
    pub async fn run<P>(&self, bus: &P, now: u64, mut shutdown: watch::Receiver<bool>)
    where
        P: EventPublisher + ?Sized,
    {
        let anchor = Instant::now();
        let mut next_slot = self.slot_at(now).unwrap_or(0);
        let mut announced_epoch: Option<Epoch> = None;
        info!(
            genesis_time = self.genesis_time,
            first_slot = next_slot,
            "Slot clock started"
        );

        loop {
            let wait = self.slot_start(next_slot).saturating_sub(now);
            let deadline = anchor + Duration::from_secs(wait);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(slot = next_slot, "Slot clock stopped");
                        return;
                    }
                    continue;
                }
            }

            let epoch = self.epoch_of(next_slot);
            if announced_epoch.map_or(true, |announced| epoch > announced) {
                bus.publish(ChainEvent::EpochStarted { epoch }).await;
                CLOCK_EVENTS.with_label_values(&["epoch"]).inc();
                announced_epoch = Some(epoch);
                info!(epoch, "Epoch started");
            }
            let delivered = bus.publish(ChainEvent::SlotStarted { slot: next_slot }).await;
            CLOCK_EVENTS.with_label_values(&["slot"]).inc();
            log_slot_event!(debug, "clock", "Slot started", next_slot, subscribers = delivered);

            next_slot += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, InMemoryEventBus};
    use std::sync::Arc;

    #[test]
    fn test_slot_arithmetic() {
        let clock = SlotClock::new(1_000, 6, 8);
        assert_eq!(clock.slot_at(999), None);
        assert_eq!(clock.slot_at(1_000), Some(0));
        assert_eq!(clock.slot_at(1_017), Some(2));
        assert_eq!(clock.slot_start(3), 1_018);
        assert_eq!(clock.epoch_of(17), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeline_order_from_genesis() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut events = bus.subscribe(EventFilter::all());
        let (stop_tx, stop_rx) = watch::channel(false);
        let clock = SlotClock::new(1_000, 6, 2);

        let clock_bus = Arc::clone(&bus);
        let handle = tokio::spawn(async move { clock.run(clock_bus.as_ref(), 990, stop_rx).await });

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(events.recv().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                ChainEvent::EpochStarted { epoch: 0 },
                ChainEvent::SlotStarted { slot: 0 },
                ChainEvent::SlotStarted { slot: 1 },
                ChainEvent::EpochStarted { epoch: 1 },
                ChainEvent::SlotStarted { slot: 2 },
                ChainEvent::SlotStarted { slot: 3 },
            ]
        );

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_epoch_start_announces_epoch() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut events = bus.subscribe(EventFilter::all());
        let (stop_tx, stop_rx) = watch::channel(false);
        let clock = SlotClock::new(0, 6, 8);

        let clock_bus = Arc::clone(&bus);
        // Slot 13 started one second ago.
        let handle = tokio::spawn(async move { clock.run(clock_bus.as_ref(), 79, stop_rx).await });

        assert_eq!(events.recv().await, Some(ChainEvent::EpochStarted { epoch: 1 }));
        assert_eq!(events.recv().await, Some(ChainEvent::SlotStarted { slot: 13 }));
        let started = Instant::now();
        assert_eq!(events.recv().await, Some(ChainEvent::SlotStarted { slot: 14 }));
        assert_eq!(started.elapsed(), Duration::from_secs(5));

        drop(stop_tx);
        handle.await.unwrap();
    }
}
