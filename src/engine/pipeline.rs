// Pipeline engine
// ModeSelector -> KeyScheduler -> LayerCodec (per layer) -> Envelope, and back

use std::sync::Arc;

use secrecy::{ExposeSecret, Secret};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use super::codec::{LayerCodec, LayerContext};
use super::envelope::{AlgorithmId, Envelope, LayerRecord, FORMAT_VERSION};
use super::mode::{Mode, ModeSelector};
use super::schedule::{layer_salt, KeyScheduler, LayerKey, MasterSecret, MASTER_SECRET_SIZE};
use super::{EngineError, EntropyBooster, Result};
use crate::config::EngineConfig;
use crate::crypto::kdf::derive_master_secret;
use crate::crypto::kyber::{Ciphertext, Kem, KeyPair, Kyber1024, PublicKey};
use crate::crypto::random::{generate_key, NONCE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Idle,
    ModeSelected(Mode),
    EnvelopeParsed(Mode),
    LayerLoop(usize),
    Sealed,
    Opened,
    Failed,
}

/// Tracks one operation's progress; only ever logged, never shared
struct StateMachine {
    state: PipelineState,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        trace!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }

    fn fail(&mut self, error: &EngineError) {
        debug!(at = ?self.state, %error, "pipeline failed");
        self.state = PipelineState::Failed;
    }
}

/// Multi-layer encryption engine.
///
/// Without a recipient key the master secret is the engine's local secret, so
/// only the same secret holder can open the envelope. With a recipient key the
/// master secret is a fresh Kyber-1024 shared secret whose encapsulation rides
/// at the front of the outermost layer.
pub struct PipelineEngine {
    config: EngineConfig,
    scheduler: KeyScheduler,
    kem: Option<Arc<dyn Kem>>,
    local_secret: Secret<[u8; MASTER_SECRET_SIZE]>,
}

impl PipelineEngine {
    /// Build an engine with a freshly generated local secret and Kyber-1024
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let scheduler = KeyScheduler::new(config.kdf, EntropyBooster::new(config.booster_workers))?;
        let local_secret = generate_key().map_err(|source| EngineError::Crypto { layer: 0, source })?;

        Ok(Self {
            config,
            scheduler,
            kem: Some(Arc::new(Kyber1024)),
            local_secret: Secret::new(local_secret),
        })
    }

    /// Replace the local secret with one held by the caller
    pub fn with_local_secret(mut self, secret: [u8; MASTER_SECRET_SIZE]) -> Self {
        self.local_secret = Secret::new(secret);
        self
    }

    /// Replace (or remove) the KEM capability.
    ///
    /// The wrap layer's algorithm id names Kyber-1024, so a replacement must
    /// produce Kyber-1024 sized encapsulations; anything else is reported as
    /// `CapabilityUnavailable` when a wrapped envelope is sealed or opened.
    pub fn with_kem(mut self, kem: Option<Arc<dyn Kem>>) -> Self {
        self.kem = kem;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encrypt `plaintext`, wrapping to `recipient` when given
    pub fn encrypt(&self, plaintext: &[u8], recipient: Option<&PublicKey>) -> Result<Vec<u8>> {
        let mut machine = StateMachine::new();
        let result = self.seal(&mut machine, plaintext, recipient);
        if let Err(error) = &result {
            machine.fail(error);
        }
        result
    }

    /// Decrypt an envelope; `keypair` is needed only for Kyber-wrapped envelopes
    pub fn decrypt(&self, envelope: &[u8], keypair: Option<&KeyPair>) -> Result<Vec<u8>> {
        let mut machine = StateMachine::new();
        let result = self.open(&mut machine, envelope, keypair);
        if let Err(error) = &result {
            machine.fail(error);
        }
        result
    }

    /// Parse an envelope without decrypting it
    pub fn inspect(&self, envelope: &[u8]) -> Result<Envelope> {
        Envelope::from_bytes(envelope)
    }

    /// Describe the active protection features
    pub fn security_level(&self) -> String {
        let mut features = Vec::new();
        match &self.kem {
            Some(kem) => features.push(format!("{} post-quantum wrap", kem.name())),
            None => features.push("local wrap only".to_string()),
        }
        features.push(format!("up to {} encryption layers", Mode::Super.layer_count()));
        features.push(format!(
            "entropy boost ({} worker{})",
            self.scheduler.booster().workers(),
            if self.scheduler.booster().workers() == 1 { "" } else { "s" }
        ));
        format!("Layered security: {}", features.join(", "))
    }

    fn seal(
        &self,
        machine: &mut StateMachine,
        plaintext: &[u8],
        recipient: Option<&PublicKey>,
    ) -> Result<Vec<u8>> {
        let plan = ModeSelector::plan(plaintext.len(), &self.config, recipient.is_some())?;
        let layer_count = plan.layers.len();

        let wraps_to_recipient = plan.layers.iter().any(|a| a.carries_encapsulation());
        let kem = if wraps_to_recipient {
            Some(self.wrap_kem(layer_count - 1)?.clone())
        } else {
            None
        };

        let overhead = kem.as_ref().map(|k| k.encapsulation_len()).unwrap_or(0);
        if plaintext.len().saturating_add(overhead) > u32::MAX as usize {
            return Err(EngineError::InvalidEnvelope(format!(
                "payload of {} bytes exceeds the envelope length field",
                plaintext.len()
            )));
        }

        if plan.layers.contains(&AlgorithmId::LocalWrap) {
            warn!(mode = %plan.mode, "no recipient key; wrap layer degraded to local secret");
        }
        machine.advance(PipelineState::ModeSelected(plan.mode));

        let (master, encapsulation) = match (kem, recipient) {
            (Some(kem), Some(public)) => {
                let (shared, encapsulation) = kem
                    .encapsulate(public)
                    .map_err(|source| EngineError::Crypto {
                        layer: layer_count - 1,
                        source,
                    })?;
                let master = self.master_from_shared(shared.as_bytes(), plan.mode, layer_count - 1)?;
                (master, Some(encapsulation.as_bytes().to_vec()))
            }
            _ => (self.local_master(), None),
        };

        let mut current = Zeroizing::new(plaintext.to_vec());
        let mut records = Vec::with_capacity(layer_count);

        for (index, &algorithm) in plan.layers.iter().enumerate() {
            machine.advance(PipelineState::LayerLoop(index));

            let context = LayerContext {
                mode: plan.mode,
                layer_count: layer_count as u8,
                index: index as u8,
                algorithm,
            };

            let nonce = LayerCodec::fresh_nonce(index)?;
            let key = self.layer_key(&master, &context, &nonce)?;

            let transport: &[u8] = match (&encapsulation, algorithm.carries_encapsulation()) {
                (Some(bytes), true) => bytes,
                _ => &[],
            };

            let codec = LayerCodec::for_algorithm(algorithm);
            let (ciphertext, tag) = codec.encode_layer(&context, &current, &key, &nonce, transport)?;

            let mut layer_bytes = Vec::with_capacity(transport.len() + ciphertext.len());
            layer_bytes.extend_from_slice(transport);
            layer_bytes.extend_from_slice(&ciphertext);

            let ciphertext_len = u32::try_from(layer_bytes.len()).map_err(|_| {
                EngineError::InvalidEnvelope(format!("layer {} ciphertext exceeds 4 GiB", index))
            })?;

            trace!(
                layer = index,
                algorithm = algorithm.name(),
                cipher = codec.cipher_name(),
                bytes = ciphertext_len,
                "layer sealed"
            );

            records.push(LayerRecord {
                algorithm,
                nonce,
                tag,
                ciphertext_len,
            });
            current = Zeroizing::new(layer_bytes);
        }

        let envelope = Envelope::new(plan.mode, records, std::mem::take(&mut *current))?;
        machine.advance(PipelineState::Sealed);

        debug!(
            mode = %plan.mode,
            layers = layer_count,
            plaintext_len = plaintext.len(),
            "envelope sealed"
        );

        Ok(envelope.to_bytes())
    }

    fn open(
        &self,
        machine: &mut StateMachine,
        bytes: &[u8],
        keypair: Option<&KeyPair>,
    ) -> Result<Vec<u8>> {
        let envelope = Envelope::from_bytes(bytes)?;
        let mode = envelope.mode();
        let records = envelope.records();
        let layer_count = records.len();
        let outer = layer_count - 1;
        machine.advance(PipelineState::EnvelopeParsed(mode));

        let (master, encapsulation_len) = if records[outer].algorithm.carries_encapsulation() {
            let kem = self.wrap_kem(outer)?;
            let keypair = keypair.ok_or_else(|| {
                EngineError::CapabilityUnavailable(format!(
                    "layer {} is KEM-wrapped; a recipient private key is required",
                    outer
                ))
            })?;

            let encapsulation_len = records[outer].algorithm.encapsulation_len();
            let ciphertext = envelope.ciphertext();
            if ciphertext.len() < encapsulation_len {
                return Err(EngineError::InvalidEnvelope(format!(
                    "layer {} is shorter than its {}-byte encapsulation",
                    outer, encapsulation_len
                )));
            }

            let encapsulation = Ciphertext::from_bytes(ciphertext[..encapsulation_len].to_vec())
                .map_err(|e| EngineError::InvalidEnvelope(format!("layer {}: {}", outer, e)))?;
            let shared = kem
                .decapsulate(keypair, &encapsulation)
                .map_err(|source| EngineError::Crypto { layer: outer, source })?;

            (self.master_from_shared(shared.as_bytes(), mode, outer)?, encapsulation_len)
        } else {
            if keypair.is_some() {
                trace!("envelope is locally keyed; ignoring recipient keypair");
            }
            (self.local_master(), 0)
        };

        let mut current = Zeroizing::new(envelope.ciphertext().to_vec());

        for index in (0..layer_count).rev() {
            machine.advance(PipelineState::LayerLoop(index));
            let record = &records[index];

            if current.len() != record.ciphertext_len as usize {
                return Err(EngineError::InvalidEnvelope(format!(
                    "layer {} declares {} ciphertext bytes, found {}",
                    index,
                    record.ciphertext_len,
                    current.len()
                )));
            }

            let context = LayerContext {
                mode,
                layer_count: layer_count as u8,
                index: index as u8,
                algorithm: record.algorithm,
            };

            let split = if record.algorithm.carries_encapsulation() {
                encapsulation_len
            } else {
                0
            };
            if current.len() < split {
                return Err(EngineError::InvalidEnvelope(format!(
                    "layer {} is shorter than its encapsulation",
                    index
                )));
            }
            let (transport, body) = current.split_at(split);

            let key = self.layer_key(&master, &context, &record.nonce)?;
            let codec = LayerCodec::for_algorithm(record.algorithm);
            let plaintext =
                codec.decode_layer(&context, body, &key, &record.nonce, &record.tag, transport)?;

            trace!(layer = index, algorithm = record.algorithm.name(), "layer opened");
            current = plaintext;
        }

        machine.advance(PipelineState::Opened);
        debug!(mode = %mode, layers = layer_count, "envelope opened");

        Ok(std::mem::take(&mut *current))
    }

    fn layer_key(
        &self,
        master: &MasterSecret,
        context: &LayerContext,
        nonce: &[u8; NONCE_SIZE],
    ) -> Result<LayerKey> {
        let salt = layer_salt(
            FORMAT_VERSION,
            context.mode.tag(),
            context.index,
            context.algorithm.id(),
            nonce,
        );
        let key = self.scheduler.derive(master, context.index, &salt)?;

        if context.algorithm == AlgorithmId::BoostedChaCha20 {
            self.scheduler.remix_boosted(&key, context.index, nonce)
        } else {
            Ok(key)
        }
    }

    /// The configured KEM, provided it matches the wrap layer's encapsulation size
    fn wrap_kem(&self, layer: usize) -> Result<&Arc<dyn Kem>> {
        let kem = self.kem.as_ref().ok_or_else(|| {
            EngineError::CapabilityUnavailable(format!(
                "layer {} is KEM-wrapped but no KEM is configured",
                layer
            ))
        })?;

        let expected = AlgorithmId::Kyber1024Wrap.encapsulation_len();
        if kem.encapsulation_len() != expected {
            return Err(EngineError::CapabilityUnavailable(format!(
                "{} produces {}-byte encapsulations, layer {} requires {}",
                kem.name(),
                kem.encapsulation_len(),
                layer,
                expected
            )));
        }

        Ok(kem)
    }

    fn master_from_shared(&self, shared: &[u8], mode: Mode, layer: usize) -> Result<MasterSecret> {
        let bytes = derive_master_secret(shared, &[FORMAT_VERSION, mode.tag()])
            .map_err(|source| EngineError::Crypto { layer, source })?;
        Ok(MasterSecret::new(bytes))
    }

    fn local_master(&self) -> MasterSecret {
        MasterSecret::new(*self.local_secret.expose_secret())
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("config", &self.config)
            .field("kem", &self.kem.as_ref().map(|k| k.name()))
            .finish_non_exhaustive()
    }
}
