// Strata library - layered multi-mode encryption with post-quantum key transport

pub mod config;
pub mod crypto;
pub mod engine;
pub mod signature;

pub use config::EngineConfig;
pub use engine::{EngineError, Envelope, Mode, PipelineEngine};
pub use signature::{sign, verify, Signature};
