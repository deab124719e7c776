//! Metrics collection for block production

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for block assembly
#[derive(Debug, Default)]
pub struct Metrics {
    /// Blocks assembled
    pub blocks_assembled: AtomicU64,

    /// Assembly attempts that failed in the state transition
    pub assembly_failures: AtomicU64,

    /// Attestations packed across all blocks
    pub attestations_included: AtomicU64,

    /// Deposits packed across all blocks
    pub deposits_included: AtomicU64,

    /// Proposer slashings packed across all blocks
    pub slashings_included: AtomicU64,

    /// Empty slots processed while advancing to the block slot
    pub slots_skipped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assembled block
    pub fn record_block_assembled(
        &self,
        attestations: usize,
        deposits: usize,
        slashings: usize,
        slots_skipped: u64,
    ) {
        self.blocks_assembled.fetch_add(1, Ordering::Relaxed);
        self.attestations_included
            .fetch_add(attestations as u64, Ordering::Relaxed);
        self.deposits_included
            .fetch_add(deposits as u64, Ordering::Relaxed);
        self.slashings_included
            .fetch_add(slashings as u64, Ordering::Relaxed);
        self.slots_skipped.fetch_add(slots_skipped, Ordering::Relaxed);
    }

    pub fn record_assembly_failure(&self) {
        self.assembly_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_blocks_assembled(&self) -> u64 {
        self.blocks_assembled.load(Ordering::Relaxed)
    }

    pub fn get_assembly_failures(&self) -> u64 {
        self.assembly_failures.load(Ordering::Relaxed)
    }

    /// Get average attestations per block
    pub fn get_avg_attestations_per_block(&self) -> f64 {
        let blocks = self.blocks_assembled.load(Ordering::Relaxed);
        if blocks == 0 {
            return 0.0;
        }
        let attestations = self.attestations_included.load(Ordering::Relaxed);
        attestations as f64 / blocks as f64
    }
}
