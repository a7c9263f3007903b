// Post-quantum key encapsulation using Kyber-1024
// Transports the per-envelope master secret to an independent recipient

use pqcrypto_kyber::kyber1024;
use pqcrypto_traits::kem::{
    Ciphertext as PQCiphertext, PublicKey as PQPublicKey, SecretKey as PQSecretKey,
    SharedSecret as PQSharedSecret,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

/// Size of the shared secret handed to the key schedule
pub const SHARED_SECRET_SIZE: usize = 32;

/// KEM capability consumed by the pipeline's wrap layer
pub trait Kem: Send + Sync {
    /// Human readable algorithm name
    fn name(&self) -> &'static str;

    /// Exact length of an encapsulation produced by this KEM
    fn encapsulation_len(&self) -> usize;

    /// Encapsulate a fresh shared secret to `public`
    fn encapsulate(&self, public: &PublicKey) -> Result<(SharedSecret, Ciphertext), CryptoError>;

    /// Recover the shared secret from `encapsulation` with the recipient's keypair
    fn decapsulate(
        &self,
        keypair: &KeyPair,
        encapsulation: &Ciphertext,
    ) -> Result<SharedSecret, CryptoError>;
}

/// Kyber-1024 backed by `pqcrypto-kyber`
#[derive(Clone, Copy, Debug, Default)]
pub struct Kyber1024;

impl Kem for Kyber1024 {
    fn name(&self) -> &'static str {
        "Kyber-1024"
    }

    fn encapsulation_len(&self) -> usize {
        kyber1024::ciphertext_bytes()
    }

    fn encapsulate(&self, public: &PublicKey) -> Result<(SharedSecret, Ciphertext), CryptoError> {
        public.encapsulate()
    }

    fn decapsulate(
        &self,
        keypair: &KeyPair,
        encapsulation: &Ciphertext,
    ) -> Result<SharedSecret, CryptoError> {
        keypair.decapsulate(encapsulation)
    }
}

/// Kyber-1024 keypair, owned by the recipient
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)]
    pub public: PublicKey,
    secret: SecretKey,
}

/// Public key wrapper
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: Vec<u8>,
}

/// Secret key wrapper (zeroized on drop)
#[derive(Zeroize, ZeroizeOnDrop)]
struct SecretKey {
    bytes: Vec<u8>,
}

/// Ciphertext from key encapsulation
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext {
    bytes: Vec<u8>,
}

/// Shared secret result (zeroized on drop)
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; SHARED_SECRET_SIZE],
}

impl KeyPair {
    /// Generate a new Kyber-1024 keypair
    pub fn generate() -> Result<Self, CryptoError> {
        let (pk, sk) = kyber1024::keypair();

        Ok(Self {
            public: PublicKey {
                bytes: pk.as_bytes().to_vec(),
            },
            secret: SecretKey {
                bytes: sk.as_bytes().to_vec(),
            },
        })
    }

    /// Decapsulate a ciphertext to obtain the shared secret
    pub fn decapsulate(&self, ciphertext: &Ciphertext) -> Result<SharedSecret, CryptoError> {
        let sk = kyber1024::SecretKey::from_bytes(&self.secret.bytes)
            .map_err(|_| CryptoError::KeyExchangeError("Invalid secret key".to_string()))?;

        let ct = kyber1024::Ciphertext::from_bytes(&ciphertext.bytes)
            .map_err(|_| CryptoError::KeyExchangeError("Invalid ciphertext".to_string()))?;

        let ss = kyber1024::decapsulate(&ct, &sk);

        let mut bytes = [0u8; SHARED_SECRET_SIZE];
        bytes.copy_from_slice(&ss.as_bytes()[..SHARED_SECRET_SIZE]);

        Ok(SharedSecret { bytes })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Encapsulate a shared secret for this public key
    pub fn encapsulate(&self) -> Result<(SharedSecret, Ciphertext), CryptoError> {
        let pk = kyber1024::PublicKey::from_bytes(&self.bytes)
            .map_err(|_| CryptoError::KeyExchangeError("Invalid public key".to_string()))?;

        let (ss, ct) = kyber1024::encapsulate(&pk);

        let mut bytes = [0u8; SHARED_SECRET_SIZE];
        bytes.copy_from_slice(&ss.as_bytes()[..SHARED_SECRET_SIZE]);

        Ok((
            SharedSecret { bytes },
            Ciphertext {
                bytes: ct.as_bytes().to_vec(),
            },
        ))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != kyber1024::public_key_bytes() {
            return Err(CryptoError::InvalidKey);
        }
        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({} bytes)", self.bytes.len())
    }
}

impl SharedSecret {
    /// Get the shared secret as a byte slice
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.bytes
    }
}

impl Ciphertext {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != kyber1024::ciphertext_bytes() {
            return Err(CryptoError::InvalidKey);
        }
        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ciphertext({} bytes)", self.bytes.len())
    }
}
