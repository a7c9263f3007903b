// Cryptographic capabilities consumed by the layered engine
// AEAD, key encapsulation, signing and key derivation primitives

pub mod aead;
pub mod kdf;
pub mod kyber;
pub mod random;
pub mod signing;

pub use aead::{AeadCipher, Aes256GcmCipher, ChaCha20Poly1305Cipher, SealedLayer, SymmetricKey};
pub use kyber::{Ciphertext, Kem, KeyPair, Kyber1024, PublicKey, SharedSecret};
pub use signing::{SignatureAlgorithm, Signer, SigningKeyPair, Verifier, VerifyingKey};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Key exchange failed: {0}")]
    KeyExchangeError(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),

    #[error("Signature error: {0}")]
    SignatureError(String),

    #[error("Invalid key material")]
    InvalidKey,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Random number generation failed")]
    RandomError,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
