// Single-layer codec
// Fresh nonces, associated-data layout and AEAD delegation for one layer

use std::sync::Arc;

use zeroize::Zeroizing;

use super::envelope::{AlgorithmId, FORMAT_VERSION};
use super::mode::Mode;
use super::schedule::LayerKey;
use super::EngineError;
use crate::crypto::aead::{AeadCipher, Aes256GcmCipher, ChaCha20Poly1305Cipher, TAG_SIZE};
use crate::crypto::random::{generate_nonce, NONCE_SIZE};
use crate::crypto::CryptoError;

const AAD_DOMAIN: &[u8] = b"strata-layer-v1";

/// Position of a layer inside its envelope, bound as associated data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerContext {
    pub mode: Mode,
    pub layer_count: u8,
    pub index: u8,
    pub algorithm: AlgorithmId,
}

impl LayerContext {
    /// domain || version || mode || layer count || index || algorithm || transport
    pub fn associated_data(&self, transport: &[u8]) -> Vec<u8> {
        let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 5 + transport.len());
        aad.extend_from_slice(AAD_DOMAIN);
        aad.extend_from_slice(&[
            FORMAT_VERSION,
            self.mode.tag(),
            self.layer_count,
            self.index,
            self.algorithm.id(),
        ]);
        aad.extend_from_slice(transport);
        aad
    }
}

/// Encodes and decodes one authenticated layer with an injected AEAD
#[derive(Clone)]
pub struct LayerCodec {
    cipher: Arc<dyn AeadCipher>,
}

impl LayerCodec {
    pub fn new(cipher: Arc<dyn AeadCipher>) -> Self {
        Self { cipher }
    }

    /// Codec backed by the standard AEAD for `algorithm`
    pub fn for_algorithm(algorithm: AlgorithmId) -> Self {
        match algorithm {
            AlgorithmId::Aes256Gcm | AlgorithmId::Kyber1024Wrap => {
                Self::new(Arc::new(Aes256GcmCipher))
            }
            AlgorithmId::BoostedChaCha20 | AlgorithmId::LocalWrap => {
                Self::new(Arc::new(ChaCha20Poly1305Cipher))
            }
        }
    }

    pub fn cipher_name(&self) -> &'static str {
        self.cipher.name()
    }

    /// Fresh random 96-bit nonce, never all zero
    pub fn fresh_nonce(layer: usize) -> Result<[u8; NONCE_SIZE], EngineError> {
        generate_nonce().map_err(|source| EngineError::Crypto { layer, source })
    }

    /// Seal `plaintext`; `transport` is authenticated but not encrypted
    pub fn encode_layer(
        &self,
        context: &LayerContext,
        plaintext: &[u8],
        key: &LayerKey,
        nonce: &[u8; NONCE_SIZE],
        transport: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE]), EngineError> {
        let aad = context.associated_data(transport);
        let sealed = self
            .cipher
            .seal(key, nonce, plaintext, &aad)
            .map_err(|source| EngineError::Crypto {
                layer: context.index as usize,
                source,
            })?;

        Ok((sealed.ciphertext, sealed.tag))
    }

    /// Verify and open one layer. A failed tag yields no plaintext at all.
    pub fn decode_layer(
        &self,
        context: &LayerContext,
        ciphertext: &[u8],
        key: &LayerKey,
        nonce: &[u8; NONCE_SIZE],
        tag: &[u8; TAG_SIZE],
        transport: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        let aad = context.associated_data(transport);
        let layer = context.index as usize;

        match self.cipher.open(key, nonce, ciphertext, tag, &aad) {
            Ok(plaintext) => Ok(Zeroizing::new(plaintext)),
            Err(CryptoError::AuthenticationFailed) => {
                Err(EngineError::AuthenticationFailure { layer })
            }
            Err(source) => Err(EngineError::Crypto { layer, source }),
        }
    }
}

impl std::fmt::Debug for LayerCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerCodec")
            .field("cipher", &self.cipher.name())
            .finish()
    }
}
