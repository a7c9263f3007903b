// Envelope wire format
// [Version:1][Mode:1][Layers:1] N x [Alg:1][Nonce:12][Tag:16][Len:4] [Ciphertext:Len(N-1)]

use bytes::{Buf, BufMut, BytesMut};

use super::mode::{LayerPlan, Mode};
use super::EngineError;
use crate::crypto::aead::TAG_SIZE;
use crate::crypto::kyber::{Kem, Kyber1024};
use crate::crypto::random::NONCE_SIZE;

/// Current envelope format version
pub const FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 3;

/// Size of one serialized layer record
pub const RECORD_SIZE: usize = 1 + NONCE_SIZE + TAG_SIZE + 4;

/// Per-layer algorithm identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlgorithmId {
    /// AES-256-GCM under a scheduled key
    Aes256Gcm = 0x01,

    /// ChaCha20-Poly1305 under a scheduled key remixed by a second boost
    BoostedChaCha20 = 0x02,

    /// Kyber-1024 encapsulation prefix, then AES-256-GCM
    Kyber1024Wrap = 0x03,

    /// ChaCha20-Poly1305 under a key from the engine's local secret
    LocalWrap = 0x04,
}

impl AlgorithmId {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmId::Aes256Gcm => "AES-256-GCM",
            AlgorithmId::BoostedChaCha20 => "Boosted ChaCha20-Poly1305",
            AlgorithmId::Kyber1024Wrap => "Kyber-1024 + AES-256-GCM",
            AlgorithmId::LocalWrap => "Local ChaCha20-Poly1305",
        }
    }

    /// True when the layer ciphertext starts with a KEM encapsulation
    pub fn carries_encapsulation(self) -> bool {
        matches!(self, AlgorithmId::Kyber1024Wrap)
    }

    /// Length of the encapsulation prefix; the wrap id pins Kyber-1024
    pub fn encapsulation_len(self) -> usize {
        if self.carries_encapsulation() {
            Kyber1024.encapsulation_len()
        } else {
            0
        }
    }

    /// Smallest ciphertext a record of this algorithm can declare (tags are detached)
    pub fn min_ciphertext_len(self) -> usize {
        self.encapsulation_len()
    }
}

impl TryFrom<u8> for AlgorithmId {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(AlgorithmId::Aes256Gcm),
            0x02 => Ok(AlgorithmId::BoostedChaCha20),
            0x03 => Ok(AlgorithmId::Kyber1024Wrap),
            0x04 => Ok(AlgorithmId::LocalWrap),
            _ => Err(EngineError::InvalidEnvelope(format!(
                "Unknown algorithm id: {}",
                value
            ))),
        }
    }
}

/// Metadata for one applied layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRecord {
    pub algorithm: AlgorithmId,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    /// Length of this layer's ciphertext (the next layer's plaintext)
    pub ciphertext_len: u32,
}

/// Self-describing output of `encrypt`; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    version: u8,
    mode: Mode,
    records: Vec<LayerRecord>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Assemble an envelope, enforcing the same rules as `from_bytes`
    pub fn new(
        mode: Mode,
        records: Vec<LayerRecord>,
        ciphertext: Vec<u8>,
    ) -> Result<Self, EngineError> {
        let envelope = Self {
            version: FORMAT_VERSION,
            mode,
            records,
            ciphertext,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    pub fn layer_count(&self) -> usize {
        self.records.len()
    }

    /// Final-layer ciphertext bytes
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(
            HEADER_SIZE + self.records.len() * RECORD_SIZE + self.ciphertext.len(),
        );

        buf.put_u8(self.version);
        buf.put_u8(self.mode.tag());
        buf.put_u8(self.records.len() as u8);

        for record in &self.records {
            buf.put_u8(record.algorithm.id());
            buf.put_slice(&record.nonce);
            buf.put_slice(&record.tag);
            buf.put_u32(record.ciphertext_len);
        }

        buf.put_slice(&self.ciphertext);
        buf.to_vec()
    }

    /// Parse and validate the wire format. Nothing is inferred from lengths.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::InvalidEnvelope(
                "Insufficient data for envelope header".to_string(),
            ));
        }

        let mut buf = bytes;

        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(EngineError::InvalidEnvelope(format!(
                "Unsupported format version: {}",
                version
            )));
        }

        let mode = Mode::try_from(buf.get_u8())?;

        let layer_count = buf.get_u8() as usize;
        if layer_count != mode.layer_count() {
            return Err(EngineError::InvalidEnvelope(format!(
                "{} mode requires {} layers, envelope declares {}",
                mode,
                mode.layer_count(),
                layer_count
            )));
        }

        if buf.remaining() < layer_count * RECORD_SIZE {
            return Err(EngineError::InvalidEnvelope(
                "Incomplete layer records".to_string(),
            ));
        }

        let mut records = Vec::with_capacity(layer_count);
        for index in 0..layer_count {
            let algorithm = AlgorithmId::try_from(buf.get_u8()).map_err(|e| {
                EngineError::InvalidEnvelope(format!("layer {}: {}", index, e))
            })?;

            let mut nonce = [0u8; NONCE_SIZE];
            buf.copy_to_slice(&mut nonce);

            let mut tag = [0u8; TAG_SIZE];
            buf.copy_to_slice(&mut tag);

            let ciphertext_len = buf.get_u32();

            records.push(LayerRecord {
                algorithm,
                nonce,
                tag,
                ciphertext_len,
            });
        }

        let envelope = Self {
            version,
            mode,
            records,
            ciphertext: buf.to_vec(),
        };
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.records.len() != self.mode.layer_count() {
            return Err(EngineError::InvalidEnvelope(format!(
                "{} mode requires {} layers, found {}",
                self.mode,
                self.mode.layer_count(),
                self.records.len()
            )));
        }

        let layout: Vec<AlgorithmId> = self.records.iter().map(|r| r.algorithm).collect();
        LayerPlan::validate_layout(self.mode, &layout)?;

        for (index, record) in self.records.iter().enumerate() {
            if (record.ciphertext_len as usize) < record.algorithm.min_ciphertext_len() {
                return Err(EngineError::InvalidEnvelope(format!(
                    "layer {} declares {} bytes, below the {} minimum for {}",
                    index,
                    record.ciphertext_len,
                    record.algorithm.min_ciphertext_len(),
                    record.algorithm.name()
                )));
            }
        }

        let declared = self
            .records
            .last()
            .map(|r| r.ciphertext_len as usize)
            .unwrap_or_default();

        if declared != self.ciphertext.len() {
            return Err(EngineError::InvalidEnvelope(format!(
                "layer {} declares {} ciphertext bytes, envelope carries {}",
                self.records.len().saturating_sub(1),
                declared,
                self.ciphertext.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(algorithm: AlgorithmId, len: u32) -> LayerRecord {
        LayerRecord {
            algorithm,
            nonce: [0x11; NONCE_SIZE],
            tag: [0x22; TAG_SIZE],
            ciphertext_len: len,
        }
    }

    fn hybrid_envelope() -> Envelope {
        Envelope::new(
            Mode::Hybrid,
            vec![
                record(AlgorithmId::Aes256Gcm, 5),
                record(AlgorithmId::LocalWrap, 5),
            ],
            b"abcde".to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_layout_bytes() {
        let envelope = hybrid_envelope();
        let bytes = envelope.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE + 2 * RECORD_SIZE + 5);
        assert_eq!(&bytes[..3], &[FORMAT_VERSION, 1, 2]);
        assert_eq!(bytes[3], AlgorithmId::Aes256Gcm.id());
        assert_eq!(&bytes[4..16], &[0x11; NONCE_SIZE]);
        assert_eq!(&bytes[16..32], &[0x22; TAG_SIZE]);
        assert_eq!(&bytes[32..36], &5u32.to_be_bytes());
        assert_eq!(bytes[36], AlgorithmId::LocalWrap.id());
        assert_eq!(&bytes[bytes.len() - 5..], b"abcde");
    }

    #[test]
    fn test_parse_matches_serialized() {
        let envelope = hybrid_envelope();
        let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_rejects_short_header() {
        assert!(Envelope::from_bytes(&[]).is_err());
        assert!(Envelope::from_bytes(&[1, 0]).is_err());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = hybrid_envelope().to_bytes();
        bytes[0] = 2;
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(EngineError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_mode_and_algorithm() {
        let mut bytes = hybrid_envelope().to_bytes();
        bytes[1] = 9;
        assert!(Envelope::from_bytes(&bytes).is_err());

        let mut bytes = hybrid_envelope().to_bytes();
        bytes[3] = 0x7F;
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_layer_count_mismatch() {
        let mut bytes = hybrid_envelope().to_bytes();
        bytes[2] = 3;
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_records() {
        let bytes = hybrid_envelope().to_bytes();
        assert!(Envelope::from_bytes(&bytes[..HEADER_SIZE + RECORD_SIZE + 3]).is_err());
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let mut bytes = hybrid_envelope().to_bytes();
        bytes.push(0);
        assert!(Envelope::from_bytes(&bytes).is_err());

        let bytes = hybrid_envelope().to_bytes();
        assert!(Envelope::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_new_rejects_invalid_layout() {
        let result = Envelope::new(
            Mode::Hybrid,
            vec![
                record(AlgorithmId::LocalWrap, 5),
                record(AlgorithmId::Aes256Gcm, 5),
            ],
            b"abcde".to_vec(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_wrap_shorter_than_encapsulation() {
        let result = Envelope::new(
            Mode::Classical,
            vec![record(AlgorithmId::Kyber1024Wrap, 5)],
            b"abcde".to_vec(),
        );
        assert!(matches!(result, Err(EngineError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_algorithm_id_conversion() {
        for alg in [
            AlgorithmId::Aes256Gcm,
            AlgorithmId::BoostedChaCha20,
            AlgorithmId::Kyber1024Wrap,
            AlgorithmId::LocalWrap,
        ] {
            assert_eq!(AlgorithmId::try_from(alg.id()).unwrap(), alg);
        }
        assert!(AlgorithmId::try_from(0).is_err());
    }
}
