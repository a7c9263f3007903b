// Message signatures
// SHA-512 digest, signed by a Dilithium3 or Ed25519 capability

use bytes::{Buf, BufMut, BytesMut};
use sha2::{Digest, Sha512};
use tracing::debug;

use crate::crypto::signing::{SignatureAlgorithm, Signer, Verifier};
use crate::crypto::{CryptoError, Result};

const HEADER_SIZE: usize = 1 + 4;

/// Signature over the SHA-512 digest of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    algorithm: SignatureAlgorithm,
    bytes: Vec<u8>,
}

impl Signature {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Raw signature produced by the primitive
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// [Alg:1][Len:4][Signature:Len]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.bytes.len());
        buf.put_u8(self.algorithm.id());
        buf.put_u32(self.bytes.len() as u32);
        buf.put_slice(&self.bytes);
        buf.to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CryptoError::SignatureError(
                "Insufficient data for signature header".to_string(),
            ));
        }

        let mut buf = bytes;
        let algorithm = SignatureAlgorithm::try_from(buf.get_u8())?;
        let len = buf.get_u32() as usize;

        if buf.remaining() != len {
            return Err(CryptoError::SignatureError(format!(
                "Signature declares {} bytes, found {}",
                len,
                buf.remaining()
            )));
        }

        Ok(Self {
            algorithm,
            bytes: buf.to_vec(),
        })
    }
}

fn message_digest(message: &[u8]) -> [u8; 64] {
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&Sha512::digest(message));
    digest
}

/// Sign `message` with `signer`
pub fn sign(message: &[u8], signer: &dyn Signer) -> Result<Signature> {
    let digest = message_digest(message);
    let bytes = signer.sign_digest(&digest)?;

    debug!(algorithm = signer.algorithm().name(), len = bytes.len(), "message signed");

    Ok(Signature {
        algorithm: signer.algorithm(),
        bytes,
    })
}

/// Check `signature` over `message`; a key of another algorithm never verifies
pub fn verify(message: &[u8], signature: &Signature, verifier: &dyn Verifier) -> bool {
    if signature.algorithm != verifier.algorithm() {
        debug!(
            signature = signature.algorithm.name(),
            key = verifier.algorithm().name(),
            "signature algorithm mismatch"
        );
        return false;
    }

    verifier.verify_digest(&message_digest(message), &signature.bytes)
}

/// Verify a serialized signature; malformed encodings verify as false
pub fn verify_encoded(message: &[u8], encoded: &[u8], verifier: &dyn Verifier) -> bool {
    match Signature::from_bytes(encoded) {
        Ok(signature) => verify(message, &signature, verifier),
        Err(e) => {
            debug!(error = %e, "malformed signature encoding");
            false
        }
    }
}
