// Engine configuration
// Mode thresholds, key-derivation work factors and booster parallelism

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{Argon2Kdf, KdfParams};
use crate::engine::EngineError;

/// Payloads of at least this many bytes use two layers
pub const DEFAULT_HYBRID_THRESHOLD: usize = 1024;

/// Payloads of at least this many bytes use three layers
pub const DEFAULT_SUPER_THRESHOLD: usize = 1_000_000;

/// Upper bound on booster workers; the search range never needs more
const MAX_BOOSTER_WORKERS: usize = 64;

/// Size thresholds used by the mode selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeThresholds {
    /// First payload length that selects Hybrid
    pub hybrid_min: usize,
    /// First payload length that selects Super
    pub super_min: usize,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            hybrid_min: DEFAULT_HYBRID_THRESHOLD,
            super_min: DEFAULT_SUPER_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ModeThresholds,

    pub kdf: KdfParams,

    /// Worker count for the entropy booster's divisor search (1 = sequential)
    pub booster_workers: usize,

    /// Fail instead of degrading a Hybrid wrap to a locally keyed layer
    pub require_post_quantum: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ModeThresholds::default(),
            kdf: KdfParams::default(),
            booster_workers: 1,
            require_post_quantum: false,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Serialization failed: {}", e)))
    }

    /// Thresholds ordered, workers in range, Argon2id parameters supported
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.thresholds.hybrid_min > self.thresholds.super_min {
            return Err(EngineError::Config(format!(
                "hybrid threshold {} exceeds super threshold {}",
                self.thresholds.hybrid_min, self.thresholds.super_min
            )));
        }

        if self.booster_workers == 0 || self.booster_workers > MAX_BOOSTER_WORKERS {
            return Err(EngineError::Config(format!(
                "booster_workers must be in 1..={}, got {}",
                MAX_BOOSTER_WORKERS, self.booster_workers
            )));
        }

        Argon2Kdf::new(self.kdf).map_err(|e| EngineError::Config(e.to_string()))?;

        Ok(())
    }
}
