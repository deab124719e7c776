//! # End-to-End Choreography
//!
//! A complete development node on the slot clock, observed only through the
//! event bus and the beacon API. Time is paused, so epochs pass instantly.
//!
//! ## Flow Under Test
//!
//! ```text
//! SlotClock ──SlotStarted──▶ DutyOrchestrator ──▶ BeaconNodeApi ──BlockImported──▶ bus
//!     │                                                │
//!     └──EpochStarted──▶ duty loading                  └──CheckpointFinalized──▶ bus
//! ```

#[cfg(test)]
mod tests {
    use node_runtime::{NodeConfig, NodeRuntime};
    use shared_bus::{ChainEvent, EventFilter, EventTopic, Subscription};
    use shared_types::Slot;
    use tokio::runtime::Handle;

    const VALIDATORS: usize = 16;
    const GENESIS_TIME: u64 = 1_000;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn devnet() -> NodeRuntime {
        let config = NodeConfig {
            validator_count: VALIDATORS,
            ..NodeConfig::devnet(GENESIS_TIME)
        };
        NodeRuntime::new(config, Handle::current()).unwrap()
    }

    /// Events up to and including the `SlotStarted` of `last`.
    async fn events_until(events: &mut Subscription, last: Slot) -> Vec<ChainEvent> {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            let done = event == ChainEvent::SlotStarted { slot: last };
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    // =============================================================================
    // E2E TESTS
    // =============================================================================

    /// Every slot after genesis gets exactly one block, imported before the
    /// next slot starts.
    #[tokio::test(start_paused = true)]
    async fn test_one_block_per_slot() {
        let mut node = devnet();
        let mut events = node.bus().subscribe(EventFilter::all());
        node.start(GENESIS_TIME);

        let seen = events_until(&mut events, 12).await;
        let mut current: Option<Slot> = None;
        let mut imported = Vec::new();
        for event in &seen {
            match event {
                ChainEvent::SlotStarted { slot } => {
                    if let Some(previous) = current.filter(|s| *s > 0) {
                        assert_eq!(imported.last(), Some(&previous), "no block for slot {previous}");
                    }
                    current = Some(*slot);
                }
                ChainEvent::BlockImported { slot, .. } => {
                    assert_eq!(Some(*slot), current);
                    imported.push(*slot);
                }
                _ => {}
            }
        }
        assert_eq!(imported, (1..12).collect::<Vec<_>>());

        node.shutdown().await;
    }

    /// With every validator online the chain justifies and then finalizes.
    #[tokio::test(start_paused = true)]
    async fn test_chain_justifies_and_finalizes() {
        let mut node = devnet();
        let mut chain = node.bus().subscribe(EventFilter::topics(vec![EventTopic::Chain]));
        node.start(GENESIS_TIME);

        // Justification starts once two epochs have ended; finality one
        // epoch later.
        let finalized = loop {
            match chain.recv().await {
                Some(ChainEvent::CheckpointFinalized(checkpoint)) => break checkpoint,
                Some(ChainEvent::BlockImported { slot, .. }) => {
                    assert!(slot <= 48, "no finality by slot {slot}");
                }
                Some(_) => {}
                None => panic!("bus closed"),
            }
        };
        assert!(finalized.epoch >= 1);

        let head = node.api().head().await;
        assert_eq!(head.state.finalized_checkpoint, finalized);
        assert!(head.state.current_justified_checkpoint.epoch > finalized.epoch);
        assert!(head.state.previous_justified_checkpoint.epoch >= finalized.epoch);

        node.shutdown().await;
    }

    /// Aggregators hold their subnet for as long as they have duties.
    #[tokio::test(start_paused = true)]
    async fn test_subnet_membership_while_running() {
        let mut node = devnet();
        let mut events = node.bus().subscribe(EventFilter::topics(vec![EventTopic::Clock]));
        node.start(GENESIS_TIME);

        events_until(&mut events, 10).await;
        assert_eq!(node.network().joined(), vec![0]);

        node.shutdown().await;
    }
}
