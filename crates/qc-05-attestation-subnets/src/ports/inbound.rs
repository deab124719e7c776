//! Inbound ports (driving side - API)

use shared_types::{CommitteeIndex, Slot, SubnetId};

/// API: Slot-scoped attestation subnet membership
pub trait SubnetSubscriptionApi: Send + Sync {
    /// Keep the subnet of `committee_index` joined through `aggregation_slot`.
    fn subscribe(&self, committee_index: CommitteeIndex, aggregation_slot: Slot) -> SubnetId;

    /// Leave every subnet whose expiry is before `current_slot`.
    fn on_slot(&self, current_slot: Slot) -> Vec<SubnetId>;
}
