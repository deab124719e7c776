//! # Node Configuration
//!
//! Unified configuration for the beacon node and every subsystem it wires.
//! Validated once, before anything is constructed.

use qc_15_deposit_chain::DepositChainConfig;
use qc_17_block_production::BlockProductionConfig;
use qc_18_validator_duties::DutyOrchestratorConfig;
use serde::Deserialize;
use shared_types::{ConfigError, ProtocolConstants};
use tracing::warn;

/// Complete node configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unix time of slot 0.
    pub genesis_time: u64,
    pub seconds_per_slot: u64,
    /// Size of the development validator set created at genesis.
    pub validator_count: usize,
    /// Events buffered per bus subscriber before it starts lagging.
    pub bus_capacity: usize,
    /// Seconds between deposit-chain blocks on the development chain.
    pub deposit_chain_seconds_per_block: u64,
    pub constants: ProtocolConstants,
    pub duties: DutyOrchestratorConfig,
    pub deposit_chain: DepositChainConfig,
    pub block_production: BlockProductionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            genesis_time: 0,
            seconds_per_slot: 12,
            validator_count: 64,
            bus_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
            deposit_chain_seconds_per_block: 14,
            constants: ProtocolConstants::default(),
            duties: DutyOrchestratorConfig::default(),
            deposit_chain: DepositChainConfig::default(),
            block_production: BlockProductionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Small local network: minimal preset, short slots.
    pub fn devnet(genesis_time: u64) -> Self {
        Self {
            genesis_time,
            seconds_per_slot: 6,
            validator_count: 32,
            constants: ProtocolConstants::minimal(),
            duties: DutyOrchestratorConfig {
                attestation_delay_ms: 2000,
                aggregation_delay_ms: 4000,
                ..DutyOrchestratorConfig::default()
            },
            deposit_chain: DepositChainConfig {
                follow_distance: 8,
                ..DepositChainConfig::default()
            },
            ..Self::default()
        }
    }

    /// Check every section.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - A slot is zero seconds long
    /// - The genesis validator set or bus capacity is empty
    /// - Duty delays do not fit within a slot
    /// - Any subsystem section is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seconds_per_slot == 0 {
            return Err(ConfigError::invalid("seconds_per_slot", "must be at least 1"));
        }
        if self.validator_count == 0 {
            return Err(ConfigError::invalid("validator_count", "must be at least 1"));
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::invalid("bus_capacity", "must be at least 1"));
        }
        if self.deposit_chain_seconds_per_block == 0 {
            return Err(ConfigError::invalid(
                "deposit_chain_seconds_per_block",
                "must be at least 1",
            ));
        }
        let slot_ms = self.seconds_per_slot.saturating_mul(1000);
        if self.duties.aggregation_delay_ms >= slot_ms {
            return Err(ConfigError::invalid(
                "duties.aggregation_delay_ms",
                format!("must be shorter than the {slot_ms}ms slot"),
            ));
        }
        self.constants.validate()?;
        self.duties.validate()?;
        self.deposit_chain.validate()?;
        self.block_production.validate()?;
        Ok(())
    }

    /// Apply `QC_*` overrides from an arbitrary variable source.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_u64(&lookup, "QC_GENESIS_TIME", &mut self.genesis_time);
        override_u64(&lookup, "QC_SECONDS_PER_SLOT", &mut self.seconds_per_slot);
        if let Some(raw) = lookup("QC_VALIDATOR_COUNT") {
            match raw.parse() {
                Ok(count) => self.validator_count = count,
                Err(_) => warn!(value = %raw, "QC_VALIDATOR_COUNT must be a number"),
            }
        }
        if let Some(graffiti) = lookup("QC_GRAFFITI") {
            self.block_production.graffiti = graffiti;
        }
    }
}

fn override_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut u64) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring non-numeric override"),
        }
    }
}
