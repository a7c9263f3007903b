// Key derivation: HKDF-SHA256 expansion, BLAKE3 keyed mixing and Argon2id
// Argon2id is the work-factor KDF behind every layer key

use argon2::{Algorithm, Argon2, Params, Version};
use blake3::Hasher as Blake3Hasher;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::CryptoError;

/// Default Argon2id memory cost in KiB (8 MiB)
pub const DEFAULT_MEMORY_KIB: u32 = 8 * 1024;

/// Default Argon2id iteration count
pub const DEFAULT_ITERATIONS: u32 = 2;

/// Default Argon2id lane count
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Argon2id work factors. Fixed per engine, never re-derived per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Argon2id instance with validated parameters and a 32-byte output
#[derive(Clone)]
pub struct Argon2Kdf {
    argon: Argon2<'static>,
}

impl Argon2Kdf {
    /// Validate `params` and build the hasher
    pub fn new(params: KdfParams) -> Result<Self, CryptoError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| CryptoError::KeyDerivationError(format!("Unsupported Argon2 parameters: {}", e)))?;

        Ok(Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Derive 32 bytes from `input` and `salt` (salt must be at least 8 bytes)
    pub fn derive(&self, input: &[u8], salt: &[u8]) -> Result<[u8; 32], CryptoError> {
        let mut output = [0u8; 32];
        self.argon
            .hash_password_into(input, salt, &mut output)
            .map_err(|e| CryptoError::KeyDerivationError(format!("Argon2 failed: {}", e)))?;
        Ok(output)
    }
}

impl std::fmt::Debug for Argon2Kdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Kdf").finish_non_exhaustive()
    }
}

/// Derive key material from input key material using HKDF
pub fn derive_keys(
    input_key_material: &[u8],
    salt: &[u8],
    info: &[u8],
    output_length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), input_key_material);

    let mut output = vec![0u8; output_length];
    hk.expand(info, &mut output)
        .map_err(|_| CryptoError::KeyDerivationError("HKDF expansion failed".to_string()))?;

    Ok(output)
}

/// Expand a KEM shared secret into a 256-bit master secret
pub fn derive_master_secret(shared_secret: &[u8], context: &[u8]) -> Result<[u8; 32], CryptoError> {
    let derived = derive_keys(shared_secret, b"strata-master-v1", context, 32)?;

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&derived);

    Ok(key_bytes)
}

/// BLAKE3 keyed hash
pub fn blake3_keyed_hash(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake3Hasher::new_keyed(key);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derive_keys() {
        let derived1 = derive_keys(b"input key material", b"salt", b"info", 32).unwrap();
        let derived2 = derive_keys(b"input key material", b"salt", b"info", 32).unwrap();

        // Deterministic derivation
        assert_eq!(derived1, derived2);
    }

    #[test]
    fn test_different_salts() {
        let derived1 = derive_keys(b"secret", b"salt1", b"info", 32).unwrap();
        let derived2 = derive_keys(b"secret", b"salt2", b"info", 32).unwrap();

        assert_ne!(derived1, derived2);
    }

    #[test]
    fn test_derive_master_secret_context() {
        let shared_secret = [42u8; 32];

        let a = derive_master_secret(&shared_secret, b"ctx-a").unwrap();
        let b = derive_master_secret(&shared_secret, b"ctx-b").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, derive_master_secret(&shared_secret, b"ctx-a").unwrap());
    }

    #[test]
    fn test_blake3_keyed_hash() {
        let key = [5u8; 32];

        let hash1 = blake3_keyed_hash(&key, b"test data");
        let hash2 = blake3_keyed_hash(&key, b"test data");
        assert_eq!(hash1, hash2);

        let hash3 = blake3_keyed_hash(&key, b"different data");
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_argon2_deterministic() {
        let kdf = Argon2Kdf::new(fast_params()).unwrap();

        let a = kdf.derive(b"password", b"saltsalt").unwrap();
        let b = kdf.derive(b"password", b"saltsalt").unwrap();
        assert_eq!(a, b);

        let c = kdf.derive(b"password", b"saltsal2").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_argon2_rejects_short_salt() {
        let kdf = Argon2Kdf::new(fast_params()).unwrap();
        assert!(kdf.derive(b"password", b"short").is_err());
    }

    #[test]
    fn test_argon2_rejects_unsupported_params() {
        let params = KdfParams {
            memory_kib: 64,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            Argon2Kdf::new(params),
            Err(CryptoError::KeyDerivationError(_))
        ));
    }
}
