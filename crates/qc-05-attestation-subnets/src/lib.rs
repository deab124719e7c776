//! # Attestation Subnets Subsystem (qc-05)
//!
//! Keeps the node joined to the gossip subnets its aggregation duties need.
//!
//! ## Behaviour
//!
//! - A committee maps to subnet `committee_index % attestation_subnet_count`.
//! - The first request for a subnet joins it on the network; later requests
//!   only extend the expiry slot, never shorten it.
//! - On each slot, subnets whose expiry slot is strictly in the past are left
//!   and forgotten.
//! - Subscribe and expiry are serialized, network calls included, so the
//!   network never sees two joins or two leaves in a row for one subnet.

pub mod ports;
pub mod service;

pub use ports::{GossipNetwork, SubnetSubscriptionApi};
pub use service::SubnetSubscriptionTracker;
