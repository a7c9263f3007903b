// Signing capabilities: Dilithium3 (post-quantum) and Ed25519 (classical)
// These sign whatever bytes they are given; digesting happens one level up

use ed25519_dalek::{Signer as DalekSigner, Verifier as DalekVerifier};
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{
    DetachedSignature as PQDetachedSignature, PublicKey as PQPublicKey, SecretKey as PQSecretKey,
};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::CryptoError;

/// Signature algorithm identifiers, bound into every signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    Dilithium3 = 0x01,
    Ed25519 = 0x02,
}

impl SignatureAlgorithm {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Dilithium3 => "Dilithium3",
            SignatureAlgorithm::Ed25519 => "Ed25519",
        }
    }
}

impl TryFrom<u8> for SignatureAlgorithm {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(SignatureAlgorithm::Dilithium3),
            0x02 => Ok(SignatureAlgorithm::Ed25519),
            _ => Err(CryptoError::SignatureError(format!(
                "Unknown signature algorithm: {}",
                value
            ))),
        }
    }
}

/// Signing half of the capability
pub trait Signer: Send + Sync {
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Sign `digest` and return the raw signature bytes
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Verifying half of the capability
pub trait Verifier: Send + Sync {
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Check `signature` over `digest`; malformed signatures verify as false
    fn verify_digest(&self, digest: &[u8], signature: &[u8]) -> bool;
}

/// Signing keypair owned by the caller
pub enum SigningKeyPair {
    Dilithium3 {
        public: Vec<u8>,
        secret: Zeroizing<Vec<u8>>,
    },
    Ed25519(ed25519_dalek::SigningKey),
}

/// Public verification key
#[derive(Clone, PartialEq, Eq)]
pub enum VerifyingKey {
    Dilithium3(Vec<u8>),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl SigningKeyPair {
    /// Generate a fresh keypair for `algorithm`
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        match algorithm {
            SignatureAlgorithm::Dilithium3 => {
                let (pk, sk) = dilithium3::keypair();
                SigningKeyPair::Dilithium3 {
                    public: pk.as_bytes().to_vec(),
                    secret: Zeroizing::new(sk.as_bytes().to_vec()),
                }
            }
            SignatureAlgorithm::Ed25519 => {
                SigningKeyPair::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
        }
    }

    /// Public half of this keypair
    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            SigningKeyPair::Dilithium3 { public, .. } => VerifyingKey::Dilithium3(public.clone()),
            SigningKeyPair::Ed25519(sk) => VerifyingKey::Ed25519(sk.verifying_key()),
        }
    }
}

impl Signer for SigningKeyPair {
    fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            SigningKeyPair::Dilithium3 { .. } => SignatureAlgorithm::Dilithium3,
            SigningKeyPair::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            SigningKeyPair::Dilithium3 { secret, .. } => {
                let sk = dilithium3::SecretKey::from_bytes(secret)
                    .map_err(|_| CryptoError::SignatureError("Invalid Dilithium3 secret key".to_string()))?;
                let sig = dilithium3::detached_sign(digest, &sk);
                Ok(sig.as_bytes().to_vec())
            }
            SigningKeyPair::Ed25519(sk) => Ok(sk.sign(digest).to_bytes().to_vec()),
        }
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({})", self.algorithm().name())
    }
}

impl VerifyingKey {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            VerifyingKey::Dilithium3(bytes) => bytes,
            VerifyingKey::Ed25519(vk) => vk.as_bytes(),
        }
    }

    /// Rebuild a verifying key from its raw encoding
    pub fn from_bytes(algorithm: SignatureAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        match algorithm {
            SignatureAlgorithm::Dilithium3 => {
                dilithium3::PublicKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
                Ok(VerifyingKey::Dilithium3(bytes.to_vec()))
            }
            SignatureAlgorithm::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
                let vk = ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map_err(|_| CryptoError::InvalidKey)?;
                Ok(VerifyingKey::Ed25519(vk))
            }
        }
    }
}

impl Verifier for VerifyingKey {
    fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            VerifyingKey::Dilithium3(_) => SignatureAlgorithm::Dilithium3,
            VerifyingKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    fn verify_digest(&self, digest: &[u8], signature: &[u8]) -> bool {
        match self {
            VerifyingKey::Dilithium3(public) => {
                let Ok(pk) = dilithium3::PublicKey::from_bytes(public) else {
                    return false;
                };
                let Ok(sig) = dilithium3::DetachedSignature::from_bytes(signature) else {
                    return false;
                };
                dilithium3::verify_detached_signature(&sig, digest, &pk).is_ok()
            }
            VerifyingKey::Ed25519(vk) => {
                let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                vk.verify(digest, &sig).is_ok()
            }
        }
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({}, {} bytes)", self.algorithm().name(), self.as_bytes().len())
    }
}
