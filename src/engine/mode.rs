// Mode selection
// Payload size picks the layer count; recipient availability picks the wrap

use super::envelope::AlgorithmId;
use super::EngineError;
use crate::config::EngineConfig;

/// Number of nested layers applied to a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    Classical = 0,
    Hybrid = 1,
    Super = 2,
}

impl Mode {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn layer_count(self) -> usize {
        match self {
            Mode::Classical => 1,
            Mode::Hybrid => 2,
            Mode::Super => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Classical => "Classical",
            Mode::Hybrid => "Hybrid",
            Mode::Super => "Super",
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Classical),
            1 => Ok(Mode::Hybrid),
            2 => Ok(Mode::Super),
            _ => Err(EngineError::InvalidEnvelope(format!("Unknown mode tag: {}", value))),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Mode plus the algorithm of every layer, in application order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPlan {
    pub mode: Mode,
    pub layers: Vec<AlgorithmId>,
}

impl LayerPlan {
    /// Check that `layers` is a layout `plan` could have produced for `mode`
    pub fn validate_layout(mode: Mode, layers: &[AlgorithmId]) -> Result<(), EngineError> {
        use AlgorithmId::*;

        let valid = match (mode, layers) {
            (Mode::Classical, [Aes256Gcm]) | (Mode::Classical, [Kyber1024Wrap]) => true,
            (Mode::Hybrid, [Aes256Gcm, LocalWrap]) | (Mode::Hybrid, [Aes256Gcm, Kyber1024Wrap]) => {
                true
            }
            (Mode::Super, [Aes256Gcm, BoostedChaCha20, LocalWrap])
            | (Mode::Super, [Aes256Gcm, BoostedChaCha20, Kyber1024Wrap]) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(EngineError::InvalidEnvelope(format!(
                "Layer layout {:?} is not valid for {} mode",
                layers, mode
            )))
        }
    }
}

/// Stateless selector over an engine configuration
pub struct ModeSelector;

impl ModeSelector {
    /// Pick the mode for a payload of `payload_len` bytes
    pub fn select(payload_len: usize, config: &EngineConfig) -> Mode {
        if payload_len >= config.thresholds.super_min {
            Mode::Super
        } else if payload_len >= config.thresholds.hybrid_min {
            Mode::Hybrid
        } else {
            Mode::Classical
        }
    }

    /// Select the mode and fix each layer's algorithm.
    ///
    /// The key-transporting wrap is always the last layer applied, so a
    /// decoder recovers the master secret before touching anything else.
    pub fn plan(
        payload_len: usize,
        config: &EngineConfig,
        recipient_present: bool,
    ) -> Result<LayerPlan, EngineError> {
        use AlgorithmId::*;

        let mode = Self::select(payload_len, config);

        let layers = match (mode, recipient_present) {
            (Mode::Classical, false) => vec![Aes256Gcm],
            (Mode::Classical, true) => vec![Kyber1024Wrap],
            (Mode::Hybrid, true) => vec![Aes256Gcm, Kyber1024Wrap],
            (Mode::Hybrid, false) | (Mode::Super, false) if config.require_post_quantum => {
                return Err(EngineError::CapabilityUnavailable(format!(
                    "{} mode requires a post-quantum recipient key",
                    mode
                )));
            }
            (Mode::Hybrid, false) => vec![Aes256Gcm, LocalWrap],
            (Mode::Super, true) => vec![Aes256Gcm, BoostedChaCha20, Kyber1024Wrap],
            (Mode::Super, false) => vec![Aes256Gcm, BoostedChaCha20, LocalWrap],
        };

        Ok(LayerPlan { mode, layers })
    }
}
