//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{ChainEvent, EventFilter};
use tokio::sync::broadcast;
use tracing::warn;

/// A filtered view onto the bus. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<ChainEvent>,
    filter: EventFilter,
    lagged: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ChainEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus is dropped. Events missed by a lagging
    /// subscriber are skipped and counted in [`Subscription::lagged`].
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Subscriber lagged, events dropped");
                    self.lagged = self.lagged.saturating_add(count);
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Events skipped because this subscriber fell behind.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::InMemoryEventBus;
    use crate::EventPublisher;
    use shared_types::Checkpoint;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Clock]));

        bus.publish(ChainEvent::CheckpointFinalized(Checkpoint::default()))
            .await;
        bus.publish(ChainEvent::SlotStarted { slot: 5 }).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, ChainEvent::SlotStarted { slot: 5 });
    }

    #[tokio::test]
    async fn test_timeline_order_preserved() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(ChainEvent::EpochStarted { epoch: 1 }).await;
        bus.publish(ChainEvent::SlotStarted { slot: 8 }).await;
        bus.publish(ChainEvent::SlotStarted { slot: 9 }).await;

        assert_eq!(sub.recv().await, Some(ChainEvent::EpochStarted { epoch: 1 }));
        assert_eq!(sub.recv().await, Some(ChainEvent::SlotStarted { slot: 8 }));
        assert_eq!(sub.recv().await, Some(ChainEvent::SlotStarted { slot: 9 }));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_without_blocking_publisher() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());

        for slot in 0..5 {
            assert_eq!(bus.publish(ChainEvent::SlotStarted { slot }).await, 1);
        }

        assert_eq!(sub.recv().await, Some(ChainEvent::SlotStarted { slot: 3 }));
        assert_eq!(sub.lagged(), 3);
    }

    #[tokio::test]
    async fn test_dropped_subscription_unsubscribes() {
        let bus = InMemoryEventBus::new();
        {
            let _sub1 = bus.subscribe(EventFilter::all());
            let _sub2 = bus.subscribe(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}
