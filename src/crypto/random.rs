// Cryptographically secure random number generation
// Provides a safe wrapper around the system CSPRNG

use rand::rngs::OsRng;
use rand::RngCore;

use super::CryptoError;

/// Size of an AEAD nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Number of redraws tolerated before an all-zero nonce is treated as an RNG fault
const MAX_NONCE_ATTEMPTS: usize = 4;

/// Generate a 256-bit random key
pub fn generate_key() -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|_| CryptoError::RandomError)?;
    Ok(key)
}

/// Generate a 96-bit nonce, never all zero
pub fn generate_nonce() -> Result<[u8; NONCE_SIZE], CryptoError> {
    for _ in 0..MAX_NONCE_ATTEMPTS {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| CryptoError::RandomError)?;

        if nonce.iter().any(|&b| b != 0) {
            return Ok(nonce);
        }
    }

    Err(CryptoError::RandomError)
}
