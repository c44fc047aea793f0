//! Per-chain key pairs derived from a root secret

use std::fmt;

use ed25519_dalek::Signer as _;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::address::{self, BitcoinNetwork};
use crate::error::{Error, Result};
use crate::hd::{Curve, DerivationPath, ExtendedKey, PathComponent};
use crate::secret::ROOT_SECRET_LEN;

/// Supported chains
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Account model, secp256k1 + Keccak-256
    Ethereum,
    /// Account model, Ed25519
    Solana,
    /// UTXO model, secp256k1 + SHA-256/RIPEMD-160
    Bitcoin,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Ethereum, Chain::Solana, Chain::Bitcoin];

    pub fn curve(&self) -> Curve {
        match self {
            Chain::Ethereum | Chain::Bitcoin => Curve::Secp256k1,
            Chain::Solana => Curve::Ed25519,
        }
    }

    /// Derivation path for the account key at `index`
    pub fn derivation_path(&self, index: u32) -> DerivationPath {
        match self {
            // m/44'/60'/0'/0/i
            Chain::Ethereum => DerivationPath::new(vec![
                PathComponent::hardened(44),
                PathComponent::hardened(60),
                PathComponent::hardened(0),
                PathComponent::normal(0),
                PathComponent::normal(index),
            ]),
            // m/44'/501'/i'/0'
            Chain::Solana => DerivationPath::new(vec![
                PathComponent::hardened(44),
                PathComponent::hardened(501),
                PathComponent::hardened(index),
                PathComponent::hardened(0),
            ]),
            // m/84'/0'/0'/0/i
            Chain::Bitcoin => DerivationPath::new(vec![
                PathComponent::hardened(84),
                PathComponent::hardened(0),
                PathComponent::hardened(0),
                PathComponent::normal(0),
                PathComponent::normal(index),
            ]),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Solana => "solana",
            Chain::Bitcoin => "bitcoin",
        }
    }

    /// Single-byte tag used in digests
    pub fn tag(&self) -> u8 {
        match self {
            Chain::Ethereum => 0x01,
            Chain::Solana => 0x02,
            Chain::Bitcoin => 0x03,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derive the key pair for `chain` at `index` from raw root secret bytes
///
/// Pure and deterministic: identical inputs always yield the identical key pair.
pub fn derive_chain_key_pair(root_secret: &[u8], chain: Chain, index: u32) -> Result<ChainKeyPair> {
    if root_secret.len() != ROOT_SECRET_LEN {
        return Err(Error::InvalidSeedLength {
            expected: ROOT_SECRET_LEN,
            actual: root_secret.len(),
        });
    }

    let master = ExtendedKey::master(chain.curve(), root_secret)?;
    let child = master.derive_path(&chain.derivation_path(index))?;
    ChainKeyPair::from_secret(chain, index, child.secret())
}

/// Ephemeral private/public key pair for one chain
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ChainKeyPair {
    #[zeroize(skip)]
    chain: Chain,
    #[zeroize(skip)]
    index: u32,
    secret: [u8; 32],
    #[zeroize(skip)]
    public: ChainPublicKey,
}

impl fmt::Debug for ChainKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKeyPair")
            .field("chain", &self.chain)
            .field("index", &self.index)
            .field("secret", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

impl ChainKeyPair {
    /// Build a key pair from a raw 32-byte private key
    pub fn from_secret(chain: Chain, index: u32, secret: &[u8; 32]) -> Result<Self> {
        let public_key = match chain.curve() {
            Curve::Secp256k1 => k256::SecretKey::from_slice(secret)
                .map_err(|e| Error::InvalidKey(format!("Invalid secp256k1 key: {}", e)))?
                .public_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
            Curve::Ed25519 => ed25519_dalek::SigningKey::from_bytes(secret)
                .verifying_key()
                .to_bytes()
                .to_vec(),
        };

        Ok(Self {
            chain,
            index,
            secret: *secret,
            public: ChainPublicKey {
                chain,
                derivation_index: index,
                public_key,
            },
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn public(&self) -> &ChainPublicKey {
        &self.public
    }

    /// Default address (mainnet for Bitcoin)
    pub fn address(&self) -> Result<String> {
        self.public.address()
    }

    /// Recoverable ECDSA over a 32-byte prehash: r || s || v with v = 27 + recovery id
    pub fn sign_prehash_recoverable(&self, prehash: &[u8; 32]) -> Result<[u8; 65]> {
        let key = self.ecdsa_key()?;
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {}", e)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(out)
    }

    /// Low-S ECDSA over a 32-byte prehash, DER encoded
    pub fn sign_prehash_der(&self, prehash: &[u8; 32]) -> Result<Vec<u8>> {
        let key = self.ecdsa_key()?;
        let signature: k256::ecdsa::Signature = key
            .sign_prehash(prehash)
            .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {}", e)))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// Ed25519 signature over the full message
    pub fn sign_ed25519(&self, message: &[u8]) -> Result<[u8; 64]> {
        if self.chain.curve() != Curve::Ed25519 {
            return Err(Error::Crypto(format!(
                "{} keys do not sign with Ed25519",
                self.chain
            )));
        }
        let key = ed25519_dalek::SigningKey::from_bytes(&self.secret);
        Ok(key.sign(message).to_bytes())
    }

    fn ecdsa_key(&self) -> Result<k256::ecdsa::SigningKey> {
        if self.chain.curve() != Curve::Secp256k1 {
            return Err(Error::Crypto(format!(
                "{} keys do not sign with ECDSA",
                self.chain
            )));
        }
        k256::ecdsa::SigningKey::from_slice(&self.secret)
            .map_err(|e| Error::InvalidKey(format!("Invalid secp256k1 key: {}", e)))
    }
}

/// Public half of a chain key, safe to cache and export
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct ChainPublicKey {
    pub chain: Chain,
    pub derivation_index: u32,
    /// Compressed SEC1 (secp256k1) or raw 32 bytes (Ed25519)
    #[serde(with = "crate::types::hex_vec")]
    pub public_key: Vec<u8>,
}

impl ChainPublicKey {
    /// Default address; Bitcoin renders on mainnet
    pub fn address(&self) -> Result<String> {
        self.address_for(BitcoinNetwork::Mainnet)
    }

    pub fn address_for(&self, network: BitcoinNetwork) -> Result<String> {
        match self.chain {
            Chain::Ethereum => address::ethereum_address(&self.uncompressed()?),
            Chain::Solana => Ok(address::solana_address(&self.ed25519_bytes()?)),
            Chain::Bitcoin => address::bitcoin_p2wpkh_address(&self.compressed()?, network),
        }
    }

    /// Compressed SEC1 encoding (secp256k1 chains only)
    pub fn compressed(&self) -> Result<[u8; 33]> {
        self.public_key.as_slice().try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "{} public key is not a 33-byte compressed point",
                self.chain
            ))
        })
    }

    /// Uncompressed SEC1 encoding, computed from the stored compressed point
    pub fn uncompressed(&self) -> Result<[u8; 65]> {
        let point = k256::PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| Error::InvalidKey(format!("Invalid secp256k1 point: {}", e)))?
            .to_encoded_point(false);
        point.as_bytes().try_into().map_err(|_| {
            Error::InvalidKey("Uncompressed point is not 65 bytes".to_string())
        })
    }

    /// Legacy P2PKH address from either public key encoding
    pub fn bitcoin_legacy_address(&self, network: BitcoinNetwork, compressed: bool) -> Result<String> {
        if self.chain != Chain::Bitcoin {
            return Err(Error::InvalidAddress(format!(
                "{} keys have no P2PKH address",
                self.chain
            )));
        }
        if compressed {
            address::bitcoin_p2pkh_address(&self.compressed()?, network)
        } else {
            address::bitcoin_p2pkh_address(&self.uncompressed()?, network)
        }
    }

    /// Canonical external string form of the public key
    pub fn to_external(&self) -> String {
        match self.chain {
            Chain::Solana => bs58::encode(&self.public_key).into_string(),
            Chain::Ethereum | Chain::Bitcoin => hex::encode(&self.public_key),
        }
    }

    fn ed25519_bytes(&self) -> Result<[u8; 32]> {
        self.public_key.as_slice().try_into().map_err(|_| {
            Error::InvalidKey("Ed25519 public key must be 32 bytes".to_string())
        })
    }
}
