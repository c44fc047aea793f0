//! Hierarchical Deterministic (HD) key derivation
//!
//! BIP-32 for secp256k1 chains and SLIP-10 for Ed25519 chains. Both start from
//! the same root seed; the curve selects the master HMAC key and whether
//! non-hardened children are allowed.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{FieldBytes, Scalar};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Bit marking a hardened child index
pub const HARDENED: u32 = 0x8000_0000;

/// Curve a derivation tree lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    /// BIP-32 over secp256k1
    Secp256k1,
    /// SLIP-10 over Ed25519 (hardened children only)
    Ed25519,
}

impl Curve {
    fn master_hmac_key(&self) -> &'static [u8] {
        match self {
            Curve::Secp256k1 => b"Bitcoin seed",
            Curve::Ed25519 => b"ed25519 seed",
        }
    }
}

/// HD derivation path component
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathComponent {
    /// Index value
    pub index: u32,
    /// Whether this is a hardened derivation
    pub hardened: bool,
}

impl PathComponent {
    /// Create a normal (non-hardened) component
    pub fn normal(index: u32) -> Self {
        Self {
            index,
            hardened: false,
        }
    }

    /// Create a hardened component
    pub fn hardened(index: u32) -> Self {
        Self {
            index,
            hardened: true,
        }
    }

    /// Get the value to use in derivation (adds 2^31 for hardened)
    pub fn value(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED
        } else {
            self.index
        }
    }
}

/// HD derivation path (e.g., m/44'/60'/0'/0/0)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivationPath {
    pub components: Vec<PathComponent>,
}

impl DerivationPath {
    /// Create a new derivation path
    pub fn new(components: Vec<PathComponent>) -> Self {
        Self { components }
    }

    /// Parse a path string such as "m/44'/60'/0'/0/0" ('h' also marks hardened)
    pub fn parse(path: &str) -> Result<Self> {
        let mut parts = path.split('/');
        if parts.next() != Some("m") {
            return Err(Error::Derivation("Path must start with 'm'".to_string()));
        }

        let mut components = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| Error::Derivation(format!("Invalid path component: {}", part)))?;
            if index & HARDENED != 0 {
                return Err(Error::Derivation(format!(
                    "Path component out of range: {}",
                    part
                )));
            }
            components.push(PathComponent { index, hardened });
        }

        Ok(Self { components })
    }

    /// Convert to string representation (e.g., "m/44'/60'/0'/0")
    pub fn to_string_path(&self) -> String {
        let mut s = String::from("m");
        for component in &self.components {
            s.push('/');
            s.push_str(&component.index.to_string());
            if component.hardened {
                s.push('\'');
            }
        }
        s
    }
}

/// Extended private key: secret material plus chain code
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExtendedKey {
    #[zeroize(skip)]
    curve: Curve,
    secret: [u8; 32],
    chain_code: [u8; 32],
}

impl std::fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("curve", &self.curve)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl ExtendedKey {
    /// Derive the master key from a seed
    pub fn master(curve: Curve, seed: &[u8]) -> Result<Self> {
        let (secret, chain_code) = hmac_sha512(curve.master_hmac_key(), &[seed])?;
        if curve == Curve::Secp256k1 {
            secp256k1_scalar(&secret)?;
        }
        Ok(Self {
            curve,
            secret,
            chain_code,
        })
    }

    /// Derive every component of `path` in turn
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self> {
        path.components
            .iter()
            .try_fold(self.clone(), |key, component| key.derive_child(*component))
    }

    /// Derive a single child key (CKDpriv)
    pub fn derive_child(&self, component: PathComponent) -> Result<Self> {
        let index = component.value().to_be_bytes();

        match self.curve {
            Curve::Ed25519 => {
                if !component.hardened {
                    return Err(Error::Derivation(
                        "Ed25519 supports hardened derivation only".to_string(),
                    ));
                }
                let (secret, chain_code) =
                    hmac_sha512(&self.chain_code, &[&[0u8], &self.secret, &index])?;
                Ok(Self {
                    curve: self.curve,
                    secret,
                    chain_code,
                })
            }
            Curve::Secp256k1 => {
                let parent = secp256k1_scalar(&self.secret)?;

                let (tweak, chain_code) = if component.hardened {
                    hmac_sha512(&self.chain_code, &[&[0u8], &self.secret, &index])?
                } else {
                    let public = k256::SecretKey::from_bytes(&FieldBytes::from(self.secret))
                        .map_err(|e| Error::Derivation(format!("Invalid parent key: {}", e)))?
                        .public_key()
                        .to_encoded_point(true);
                    hmac_sha512(&self.chain_code, &[public.as_bytes(), &index])?
                };

                let tweak = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(tweak)))
                    .ok_or_else(|| Error::Derivation("Derived tweak out of range".to_string()))?;
                let child = tweak + parent;
                if bool::from(child.is_zero()) {
                    return Err(Error::Derivation("Derived key is zero".to_string()));
                }

                Ok(Self {
                    curve: self.curve,
                    secret: child.to_repr().into(),
                    chain_code,
                })
            }
        }
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Get the secret key material (use with caution!)
    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }
}

/// Parse 32 bytes as a valid (non-zero, in-range) secp256k1 scalar
fn secp256k1_scalar(bytes: &[u8; 32]) -> Result<Scalar> {
    let scalar = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(*bytes)))
        .ok_or_else(|| Error::Derivation("Key material out of curve order".to_string()))?;
    if bool::from(scalar.is_zero()) {
        return Err(Error::Derivation("Key material is zero".to_string()));
    }
    Ok(scalar)
}

/// HMAC-SHA512 split into (IL, IR)
fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<([u8; 32], [u8; 32])> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Derivation(format!("HMAC key rejected: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let output = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..]);
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIP32_SEED_1: &str = "000102030405060708090a0b0c0d0e0f";

    fn seed() -> Vec<u8> {
        hex::decode(BIP32_SEED_1).unwrap()
    }

    #[test]
    fn test_path_component() {
        let normal = PathComponent::normal(0);
        assert!(!normal.hardened);
        assert_eq!(normal.value(), 0);

        let hardened = PathComponent::hardened(0);
        assert!(hardened.hardened);
        assert_eq!(hardened.value(), 0x80000000);
    }

    #[test]
    fn test_derivation_path_parse() {
        let path = DerivationPath::parse("m/44'/60'/0'/0/7").unwrap();
        assert_eq!(path.components.len(), 5);
        assert_eq!(path.components[0], PathComponent::hardened(44));
        assert_eq!(path.components[4], PathComponent::normal(7));
        assert_eq!(path.to_string_path(), "m/44'/60'/0'/0/7");

        let alt = DerivationPath::parse("m/44h/501h").unwrap();
        assert_eq!(alt.to_string_path(), "m/44'/501'");
    }

    #[test]
    fn test_derivation_path_parse_errors() {
        assert!(DerivationPath::parse("44'/60'").is_err());
        assert!(DerivationPath::parse("m/abc").is_err());
        assert!(DerivationPath::parse("m/2147483648").is_err());
    }

    #[test]
    fn test_bip32_vector_1_master() {
        let master = ExtendedKey::master(Curve::Secp256k1, &seed()).unwrap();
        assert_eq!(
            hex::encode(master.secret()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(master.chain_code()),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
    }

    #[test]
    fn test_bip32_vector_1_children() {
        let master = ExtendedKey::master(Curve::Secp256k1, &seed()).unwrap();

        let hardened = master
            .derive_path(&DerivationPath::parse("m/0'").unwrap())
            .unwrap();
        assert_eq!(
            hex::encode(hardened.secret()),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
        assert_eq!(
            hex::encode(hardened.chain_code()),
            "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141"
        );

        // Non-hardened step exercises the public-key branch
        let normal = master
            .derive_path(&DerivationPath::parse("m/0'/1").unwrap())
            .unwrap();
        assert_eq!(
            hex::encode(normal.secret()),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
        assert_eq!(
            hex::encode(normal.chain_code()),
            "2a7857631386ba23dacac34180dd1983734e444fdbf774041578e9b6adb37c19"
        );
    }

    #[test]
    fn test_slip10_ed25519_vector_1() {
        let master = ExtendedKey::master(Curve::Ed25519, &seed()).unwrap();
        assert_eq!(
            hex::encode(master.secret()),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        assert_eq!(
            hex::encode(master.chain_code()),
            "90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb"
        );

        let child = master.derive_child(PathComponent::hardened(0)).unwrap();
        assert_eq!(
            hex::encode(child.secret()),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
        assert_eq!(
            hex::encode(child.chain_code()),
            "8b59aa11380b624e81507a27fedda59fea6d0b779a778918a2fd3590e16e9c69"
        );
    }

    #[test]
    fn test_ed25519_rejects_normal_child() {
        let master = ExtendedKey::master(Curve::Ed25519, &seed()).unwrap();
        assert!(matches!(
            master.derive_child(PathComponent::normal(0)),
            Err(Error::Derivation(_))
        ));
    }

    #[test]
    fn test_deterministic_derivation() {
        let path = DerivationPath::parse("m/44'/60'/0'/0/5").unwrap();
        let a = ExtendedKey::master(Curve::Secp256k1, &seed())
            .unwrap()
            .derive_path(&path)
            .unwrap();
        let b = ExtendedKey::master(Curve::Secp256k1, &seed())
            .unwrap()
            .derive_path(&path)
            .unwrap();
        assert_eq!(a.secret(), b.secret());
        assert_eq!(a.chain_code(), b.chain_code());
    }
}
