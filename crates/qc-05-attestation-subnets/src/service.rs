//! Subnet subscription tracker service

use crate::ports::{GossipNetwork, SubnetSubscriptionApi};
use parking_lot::Mutex;
use shared_types::{CommitteeIndex, Slot, SubnetId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks which attestation subnets must stay joined and until when.
///
/// The map from subnet to expiry slot holds at most one entry per subnet.
/// `subscribe` and `on_slot` run under one lock, including the network calls
/// they make, so a refresh can never race an expiry of the same subnet.
pub struct SubnetSubscriptionTracker<N: GossipNetwork> {
    network: Arc<N>,
    subnet_count: u64,
    subscriptions: Mutex<HashMap<SubnetId, Slot>>,
}

impl<N: GossipNetwork> SubnetSubscriptionTracker<N> {
    /// Create a tracker over `subnet_count` attestation subnets.
    pub fn new(network: Arc<N>, subnet_count: u64) -> Self {
        Self {
            network,
            subnet_count: subnet_count.max(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Subnet carrying attestations for `committee_index`.
    pub fn subnet_for(&self, committee_index: CommitteeIndex) -> SubnetId {
        committee_index % self.subnet_count
    }

    /// Expiry slot of `subnet`, if subscribed.
    pub fn expiry_of(&self, subnet: SubnetId) -> Option<Slot> {
        self.subscriptions.lock().get(&subnet).copied()
    }

    /// Currently subscribed subnets, sorted.
    pub fn active_subnets(&self) -> Vec<SubnetId> {
        let mut subnets: Vec<_> = self.subscriptions.lock().keys().copied().collect();
        subnets.sort_unstable();
        subnets
    }
}

impl<N: GossipNetwork> SubnetSubscriptionApi for SubnetSubscriptionTracker<N> {
    fn subscribe(&self, committee_index: CommitteeIndex, aggregation_slot: Slot) -> SubnetId {
        let subnet = self.subnet_for(committee_index);
        let mut subscriptions = self.subscriptions.lock();
        match subscriptions.get_mut(&subnet) {
            Some(expiry) => {
                *expiry = (*expiry).max(aggregation_slot);
                debug!(subnet, expiry = *expiry, "[qc-05] Subnet subscription refreshed");
            }
            None => {
                self.network.subscribe_subnet(subnet);
                subscriptions.insert(subnet, aggregation_slot);
                info!(subnet, expiry = aggregation_slot, "[qc-05] Subscribed to attestation subnet");
            }
        }
        subnet
    }

    fn on_slot(&self, current_slot: Slot) -> Vec<SubnetId> {
        let mut subscriptions = self.subscriptions.lock();
        let mut expired: Vec<SubnetId> = subscriptions
            .iter()
            .filter(|(_, expiry)| **expiry < current_slot)
            .map(|(subnet, _)| *subnet)
            .collect();
        expired.sort_unstable();

        for subnet in &expired {
            subscriptions.remove(subnet);
            self.network.unsubscribe_subnet(*subnet);
        }
        if !expired.is_empty() {
            info!(
                slot = current_slot,
                subnets = ?expired,
                "[qc-05] Unsubscribed from expired attestation subnets"
            );
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Subscribe(SubnetId),
        Unsubscribe(SubnetId),
    }

    #[derive(Default)]
    struct RecordingNetwork {
        calls: Mutex<Vec<Call>>,
    }

    impl GossipNetwork for RecordingNetwork {
        fn subscribe_subnet(&self, subnet: SubnetId) {
            self.calls.lock().push(Call::Subscribe(subnet));
        }

        fn unsubscribe_subnet(&self, subnet: SubnetId) {
            self.calls.lock().push(Call::Unsubscribe(subnet));
        }
    }

    fn tracker() -> (Arc<RecordingNetwork>, SubnetSubscriptionTracker<RecordingNetwork>) {
        let network = Arc::new(RecordingNetwork::default());
        let tracker = SubnetSubscriptionTracker::new(Arc::clone(&network), 64);
        (network, tracker)
    }

    #[test]
    fn test_later_request_never_shortens_expiry() {
        let (network, tracker) = tracker();
        let subnet = tracker.subscribe(3, 10);
        tracker.subscribe(3, 5);

        assert_eq!(tracker.expiry_of(subnet), Some(10));
        assert_eq!(*network.calls.lock(), vec![Call::Subscribe(3)]);

        assert!(tracker.on_slot(10).is_empty());
        assert_eq!(tracker.on_slot(11), vec![3]);
        assert!(tracker.on_slot(12).is_empty());
        assert_eq!(
            *network.calls.lock(),
            vec![Call::Subscribe(3), Call::Unsubscribe(3)]
        );
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let (_, tracker) = tracker();
        tracker.subscribe(1, 5);
        tracker.subscribe(1, 9);
        assert!(tracker.on_slot(6).is_empty());
        assert_eq!(tracker.expiry_of(1), Some(9));
    }

    #[test]
    fn test_committees_sharing_subnet() {
        let (network, tracker) = tracker();
        assert_eq!(tracker.subscribe(2, 4), 2);
        assert_eq!(tracker.subscribe(66, 8), 2);
        assert_eq!(tracker.active_subnets(), vec![2]);
        assert_eq!(network.calls.lock().len(), 1);
        assert_eq!(tracker.expiry_of(2), Some(8));
    }

    #[test]
    fn test_on_slot_without_subscriptions_is_noop() {
        let (network, tracker) = tracker();
        for slot in 0..5 {
            assert!(tracker.on_slot(slot).is_empty());
        }
        assert!(network.calls.lock().is_empty());
    }

    #[test]
    fn test_resubscribe_after_expiry() {
        let (network, tracker) = tracker();
        tracker.subscribe(7, 1);
        tracker.on_slot(2);
        tracker.subscribe(7, 3);
        assert_eq!(
            *network.calls.lock(),
            vec![Call::Subscribe(7), Call::Unsubscribe(7), Call::Subscribe(7)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_expiry_stay_balanced() {
        let (network, tracker) = tracker();
        let tracker = Arc::new(tracker);

        let mut tasks = Vec::new();
        for i in 0..64u64 {
            let tracker = Arc::clone(&tracker);
            tasks.push(tokio::spawn(async move {
                tracker.subscribe(i % 4, i);
                tracker.on_slot(i / 2);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        tracker.on_slot(u64::MAX);

        // Every subnet alternates subscribe/unsubscribe and ends unsubscribed.
        let calls = network.calls.lock();
        for subnet in 0..4 {
            let sequence: Vec<_> = calls
                .iter()
                .filter(|c| matches!(c, Call::Subscribe(s) | Call::Unsubscribe(s) if *s == subnet))
                .collect();
            assert!(!sequence.is_empty());
            for (i, call) in sequence.iter().enumerate() {
                let expected = if i % 2 == 0 {
                    Call::Subscribe(subnet)
                } else {
                    Call::Unsubscribe(subnet)
                };
                assert_eq!(**call, expected);
            }
            assert_eq!(sequence.len() % 2, 0);
        }
        assert!(tracker.active_subnets().is_empty());
    }
}
