//! Outbound ports (driven side - SPI)

use shared_types::SubnetId;

/// Port: Gossip topic membership on the P2P network
///
/// Calls are made while the tracker holds its lock, so implementations must
/// only register the change and return.
pub trait GossipNetwork: Send + Sync {
    /// Join the attestation topic of `subnet`.
    fn subscribe_subnet(&self, subnet: SubnetId);

    /// Leave the attestation topic of `subnet`.
    fn unsubscribe_subnet(&self, subnet: SubnetId);
}
