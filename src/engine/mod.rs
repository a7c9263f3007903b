// Layered encryption engine
// Mode selection, key schedule, per-layer codec, envelope framing and orchestration

pub mod booster;
pub mod codec;
pub mod envelope;
pub mod mode;
pub mod pipeline;
pub mod schedule;

pub use booster::EntropyBooster;
pub use codec::LayerCodec;
pub use envelope::{AlgorithmId, Envelope, LayerRecord, FORMAT_VERSION};
pub use mode::{LayerPlan, Mode, ModeSelector};
pub use pipeline::PipelineEngine;
pub use schedule::{KeyScheduler, LayerKey, MasterSecret};

use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed framing, unknown version, mode or algorithm id
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Tag mismatch; no plaintext from this or any inner layer is released
    #[error("Authentication failed at layer {layer}")]
    AuthenticationFailure { layer: usize },

    #[error("Key derivation failed{}: {reason}", layer_suffix(.layer))]
    KeyDerivationFailure { layer: Option<usize>, reason: String },

    /// Reported before any key material is generated
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Crypto error at layer {layer}: {source}")]
    Crypto {
        layer: usize,
        #[source]
        source: CryptoError,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn layer_suffix(layer: &Option<usize>) -> String {
    match layer {
        Some(layer) => format!(" at layer {}", layer),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
