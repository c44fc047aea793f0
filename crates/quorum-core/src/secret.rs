//! Root secret: the single source of every chain key for an account

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chain::{derive_chain_key_pair, Chain, ChainKeyPair};
use crate::crypto::sha256_multi;
use crate::error::{Error, Result};

/// Root secret length in bytes (a BIP-39 seed)
pub const ROOT_SECRET_LEN: usize = 64;

/// Master entropy from which all chain keys are derived
///
/// Deliberately not `Clone`: a root secret lives in the secret store and is
/// only materialized for the duration of a derivation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RootSecret([u8; ROOT_SECRET_LEN]);

impl RootSecret {
    /// Validate and wrap raw root secret bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; ROOT_SECRET_LEN] =
            bytes.try_into().map_err(|_| Error::InvalidSeedLength {
                expected: ROOT_SECRET_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Generate a fresh root secret from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; ROOT_SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let secret = Self(bytes);
        bytes.zeroize();
        secret
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_SECRET_LEN] {
        &self.0
    }

    /// Derive the key pair for `chain` at `index`
    pub fn derive(&self, chain: Chain, index: u32) -> Result<ChainKeyPair> {
        derive_chain_key_pair(&self.0, chain, index)
    }

    /// Short non-secret identifier, stable for a given root secret
    pub fn fingerprint(&self) -> [u8; 8] {
        let digest = sha256_multi(&[b"quorum.root-secret.fingerprint.v1", &self.0]);
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        out
    }
}

impl std::fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootSecret([REDACTED], fingerprint={})", hex::encode(self.fingerprint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_accepts_exact_length() {
        let secret = RootSecret::from_bytes(&[0x42; ROOT_SECRET_LEN]).unwrap();
        assert_eq!(secret.as_bytes(), &[0x42; ROOT_SECRET_LEN]);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        for len in [0usize, 16, 32, 63, 65] {
            match RootSecret::from_bytes(&vec![1u8; len]) {
                Err(Error::InvalidSeedLength { expected, actual }) => {
                    assert_eq!(expected, ROOT_SECRET_LEN);
                    assert_eq!(actual, len);
                }
                other => panic!("expected InvalidSeedLength for {}, got {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_generate_is_random() {
        let a = RootSecret::generate();
        let b = RootSecret::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = RootSecret::from_bytes(&[0xAB; ROOT_SECRET_LEN]).unwrap();
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("abababab"));
    }
}
