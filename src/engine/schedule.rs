// Per-layer key schedule
// LayerKey = Argon2id(master || boost(seed(master)) || layer_index, salt)

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::booster::{EntropyBooster, SEED_LIMIT};
use super::EngineError;
use crate::crypto::kdf::{blake3_keyed_hash, Argon2Kdf, KdfParams};
use crate::crypto::random::NONCE_SIZE;
use crate::crypto::SymmetricKey;

pub const MASTER_SECRET_SIZE: usize = 32;

const SALT_DOMAIN: &[u8] = b"strata-layer-salt-v1";
const REMIX_DOMAIN: &[u8] = b"strata-boost-remix-v1";

/// Key for a single layer; lives for one encode or decode call
pub type LayerKey = SymmetricKey;

/// Root secret of one envelope (zeroized on drop)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    bytes: [u8; MASTER_SECRET_SIZE],
}

impl MasterSecret {
    pub fn new(bytes: [u8; MASTER_SECRET_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_SECRET_SIZE] {
        &self.bytes
    }

    /// Big-endian value of the secret reduced mod 2^20
    pub fn entropy_seed(&self) -> u32 {
        seed_from_be_tail(&self.bytes)
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// Low 20 bits of a big-endian integer are the low 20 bits of its last three bytes
fn seed_from_be_tail(bytes: &[u8]) -> u32 {
    let tail = bytes
        .iter()
        .rev()
        .take(3)
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
    tail % SEED_LIMIT
}

/// Salt binding a layer key to its envelope position and fresh nonce
pub fn layer_salt(
    version: u8,
    mode_tag: u8,
    layer_index: u8,
    algorithm_id: u8,
    nonce: &[u8; NONCE_SIZE],
) -> Vec<u8> {
    let mut salt = Vec::with_capacity(SALT_DOMAIN.len() + 4 + NONCE_SIZE);
    salt.extend_from_slice(SALT_DOMAIN);
    salt.extend_from_slice(&[version, mode_tag, layer_index, algorithm_id]);
    salt.extend_from_slice(nonce);
    salt
}

/// Derives layer keys. Every step after the master secret is fixed is a pure function.
#[derive(Clone, Debug)]
pub struct KeyScheduler {
    kdf: Argon2Kdf,
    booster: EntropyBooster,
}

impl KeyScheduler {
    /// Validate the work factors once; they are not re-derived per call
    pub fn new(params: KdfParams, booster: EntropyBooster) -> Result<Self, EngineError> {
        let kdf = Argon2Kdf::new(params).map_err(|e| EngineError::KeyDerivationFailure {
            layer: None,
            reason: e.to_string(),
        })?;

        Ok(Self { kdf, booster })
    }

    pub fn booster(&self) -> &EntropyBooster {
        &self.booster
    }

    /// Derive the key for `layer_index` under `salt`
    pub fn derive(
        &self,
        master: &MasterSecret,
        layer_index: u8,
        salt: &[u8],
    ) -> Result<LayerKey, EngineError> {
        let boosted = self.booster.boost(master.entropy_seed()).map_err(|e| {
            EngineError::KeyDerivationFailure {
                layer: Some(layer_index as usize),
                reason: e.to_string(),
            }
        })?;

        let mut input = Zeroizing::new(Vec::with_capacity(MASTER_SECRET_SIZE + 33));
        input.extend_from_slice(master.as_bytes());
        input.extend_from_slice(&boosted);
        input.push(layer_index);

        let key = Zeroizing::new(self.kdf.derive(&input, salt).map_err(|e| {
            EngineError::KeyDerivationFailure {
                layer: Some(layer_index as usize),
                reason: e.to_string(),
            }
        })?);

        Ok(LayerKey::new(*key))
    }

    /// Second boost round for boosted layers, seeded from the layer nonce
    pub fn remix_boosted(
        &self,
        key: &LayerKey,
        layer_index: u8,
        nonce: &[u8; NONCE_SIZE],
    ) -> Result<LayerKey, EngineError> {
        let boosted = self.booster.boost(seed_from_be_tail(nonce)).map_err(|e| {
            EngineError::KeyDerivationFailure {
                layer: Some(layer_index as usize),
                reason: e.to_string(),
            }
        })?;

        let mut data = Vec::with_capacity(REMIX_DOMAIN.len() + 33);
        data.extend_from_slice(REMIX_DOMAIN);
        data.push(layer_index);
        data.extend_from_slice(&boosted);

        Ok(LayerKey::new(blake3_keyed_hash(key.as_bytes(), &data)))
    }
}
