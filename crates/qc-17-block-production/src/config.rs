//! Configuration types for block production

use serde::Deserialize;
use shared_types::{ConfigError, Hash};

/// Runtime configuration for block production
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlockProductionConfig {
    /// Free-form text stamped into every produced block (at most 32 bytes)
    pub graffiti: String,
}

impl BlockProductionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graffiti.len() > 32 {
            return Err(ConfigError::invalid(
                "graffiti",
                format!("is {} bytes, at most 32 allowed", self.graffiti.len()),
            ));
        }
        Ok(())
    }

    /// Graffiti as a zero-padded 32-byte field.
    pub fn graffiti_bytes(&self) -> Hash {
        let mut bytes = [0u8; 32];
        let raw = self.graffiti.as_bytes();
        let len = raw.len().min(32);
        bytes[..len].copy_from_slice(&raw[..len]);
        bytes
    }
}
