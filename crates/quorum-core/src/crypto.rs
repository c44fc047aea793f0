//! Hash primitives shared by derivation, addresses, and serialization

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Hash data using SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple pieces of data using SHA256
pub fn sha256_multi(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().into()
}

/// SHA256(SHA256(data)), used by Bitcoin sighashes
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Keccak-256 (the pre-standard SHA-3 variant Ethereum uses)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash160 = RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let ripemd_hash = Ripemd160::digest(sha256(data));
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd_hash);
    out
}
