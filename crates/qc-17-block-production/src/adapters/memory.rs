//! In-memory operation pools.

use crate::ports::{AttestationPool, ExternalDataCache, SlashingPool};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    Attestation, AttestationData, CandidateBlock, ChainState, ExternalDataRecord, ProposerSlashing,
    ProtocolConstants, Slot,
};
use tracing::debug;

/// Attestations received from gossip or local validators.
///
/// An attestation whose bits are covered by a pooled attestation with the
/// same data is redundant and not stored; pooled attestations it covers are
/// replaced.
pub struct InMemoryAttestationPool {
    constants: ProtocolConstants,
    attestations: RwLock<Vec<Attestation>>,
}

fn covers(wider: &Attestation, narrower: &Attestation) -> bool {
    wider.data == narrower.data
        && wider.aggregation_bits.len() == narrower.aggregation_bits.len()
        && wider
            .aggregation_bits
            .iter()
            .zip(&narrower.aggregation_bits)
            .all(|(w, n)| *w || !*n)
}

impl InMemoryAttestationPool {
    pub fn new(constants: ProtocolConstants) -> Self {
        Self {
            constants,
            attestations: RwLock::new(Vec::new()),
        }
    }

    /// Add an attestation. Returns false if it was redundant.
    pub fn add(&self, attestation: Attestation) -> bool {
        let mut pooled = self.attestations.write();
        if pooled.iter().any(|p| covers(p, &attestation)) {
            return false;
        }
        pooled.retain(|p| !covers(&attestation, p));
        debug!(
            slot = attestation.data.slot,
            index = attestation.data.index,
            participants = attestation.participant_count(),
            "[qc-17] Attestation pooled"
        );
        pooled.push(attestation);
        true
    }

    /// Drop attestations too old to be included at `current_slot`.
    pub fn prune(&self, current_slot: Slot) {
        let window = self.constants.slots_per_epoch;
        self.attestations
            .write()
            .retain(|a| a.data.slot.saturating_add(window) >= current_slot);
    }

    /// Forget attestations carried by an imported block.
    pub fn on_block_imported(&self, block: &CandidateBlock) {
        self.attestations.write().retain(|pooled| {
            !block
                .body
                .attestations
                .iter()
                .any(|included| covers(included, pooled))
        });
    }

    /// Widest pooled attestation voting for `data`.
    pub fn best_for(&self, data: &AttestationData) -> Option<Attestation> {
        self.attestations
            .read()
            .iter()
            .filter(|a| a.data == *data)
            .max_by_key(|a| a.participant_count())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.attestations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestations.read().is_empty()
    }
}

#[async_trait]
impl AttestationPool for InMemoryAttestationPool {
    /// Attestations inside their inclusion window at `slot`, widest coverage
    /// first, earliest slot breaking ties. Not capped: the block maximum is
    /// applied after the engine drops attestations invalid for the state.
    async fn attestations_for(&self, slot: Slot) -> Vec<Attestation> {
        let c = &self.constants;
        let mut eligible: Vec<Attestation> = self
            .attestations
            .read()
            .iter()
            .filter(|a| {
                a.data.slot.saturating_add(c.min_attestation_inclusion_delay) <= slot
                    && slot <= a.data.slot.saturating_add(c.slots_per_epoch)
            })
            .cloned()
            .collect();
        eligible.sort_by(|a, b| {
            b.participant_count()
                .cmp(&a.participant_count())
                .then(a.data.slot.cmp(&b.data.slot))
        });
        eligible
    }
}

/// Proposer slashings awaiting inclusion.
#[derive(Default)]
pub struct InMemorySlashingPool {
    slashings: RwLock<Vec<ProposerSlashing>>,
}

impl InMemorySlashingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, slashing: ProposerSlashing) {
        let mut slashings = self.slashings.write();
        if !slashings.contains(&slashing) {
            slashings.push(slashing);
        }
    }

    /// Forget slashings carried by an imported block.
    pub fn on_block_imported(&self, block: &CandidateBlock) {
        self.slashings
            .write()
            .retain(|s| !block.body.proposer_slashings.contains(s));
    }
}

#[async_trait]
impl SlashingPool for InMemorySlashingPool {
    async fn proposer_slashings(&self) -> Vec<ProposerSlashing> {
        self.slashings.read().clone()
    }
}

/// Votes for the record already in the state. Used when no deposit chain is
/// followed.
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentExternalData;

#[async_trait]
impl ExternalDataCache for CurrentExternalData {
    async fn vote_for(&self, state: &ChainState) -> ExternalDataRecord {
        state.external_data
    }
}
