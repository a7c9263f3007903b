// Authenticated encryption with detached tags
// AES-256-GCM and ChaCha20-Poly1305 behind a single capability trait

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::consts::{U12, U16};
use chacha20poly1305::aead::{AeadCore, AeadInPlace, KeyInit, Nonce, Tag};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::random::NONCE_SIZE;
use super::CryptoError;

/// Size of a detached authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of a symmetric key in bytes
pub const KEY_SIZE: usize = 32;

/// Symmetric key for a single AEAD layer (zeroized on drop)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Create a new symmetric key from bytes
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the key as a byte slice
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Output of a sealing operation: ciphertext with the tag split off
#[derive(Clone, Debug)]
pub struct SealedLayer {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

/// AEAD capability used by the layer codec.
///
/// Implementations must be safe to share across threads; every call is
/// independent and keyed by the caller.
pub trait AeadCipher: Send + Sync {
    /// Human readable algorithm name
    fn name(&self) -> &'static str;

    /// Encrypt `plaintext`, binding `aad`, and return ciphertext plus detached tag
    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<SealedLayer, CryptoError>;

    /// Verify `tag` over `ciphertext` and `aad`, then decrypt
    fn open(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM
#[derive(Clone, Copy, Debug, Default)]
pub struct Aes256GcmCipher;

/// ChaCha20-Poly1305 (IETF, 96-bit nonce)
#[derive(Clone, Copy, Debug, Default)]
pub struct ChaCha20Poly1305Cipher;

impl AeadCipher for Aes256GcmCipher {
    fn name(&self) -> &'static str {
        "AES-256-GCM"
    }

    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<SealedLayer, CryptoError> {
        seal_detached::<Aes256Gcm>(key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        open_detached::<Aes256Gcm>(key, nonce, ciphertext, tag, aad)
    }
}

impl AeadCipher for ChaCha20Poly1305Cipher {
    fn name(&self) -> &'static str {
        "ChaCha20-Poly1305"
    }

    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<SealedLayer, CryptoError> {
        seal_detached::<ChaCha20Poly1305>(key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        open_detached::<ChaCha20Poly1305>(key, nonce, ciphertext, tag, aad)
    }
}

fn seal_detached<C>(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedLayer, CryptoError>
where
    C: KeyInit + AeadInPlace + AeadCore<NonceSize = U12, TagSize = U16>,
{
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<C>::from_slice(nonce), aad, &mut buffer)
        .map_err(|e| CryptoError::EncryptionError(format!("Encryption failed: {}", e)))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(SealedLayer {
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

fn open_detached<C>(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError>
where
    C: KeyInit + AeadInPlace + AeadCore<NonceSize = U12, TagSize = U16>,
{
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::<C>::from_slice(nonce),
            aad,
            &mut buffer,
            Tag::<C>::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Ok(buffer)
}
