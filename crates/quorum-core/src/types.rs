//! Core newtypes and serde helpers

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::Verifier;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Ed25519 public key of an enrolled device (32 bytes)
///
/// The canonical external representation is base-58 of the raw key bytes.
/// That string is the token a sharding policy uses to authorize the device.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevicePublicKey(pub [u8; 32]);

impl DevicePublicKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical base-58 encoding
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Parse the canonical base-58 encoding
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| Error::InvalidKey(format!("Invalid base58 device key: {}", e)))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidKey(format!("Device key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Verify an Ed25519 signature made by this device
    pub fn verify(&self, message: &[u8], signature: &DeviceSignature) -> Result<()> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| Error::InvalidKey(format!("Invalid device key: {}", e)))?;
        let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        key.verify(message, &sig)
            .map_err(|_| Error::SignatureVerificationFailed)
    }
}

impl fmt::Display for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePublicKey({})", self.to_base58())
    }
}

impl FromStr for DevicePublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base58(s)
    }
}

impl Serialize for DevicePublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for DevicePublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature produced by a device key (64 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignature(#[serde(with = "hex_array")] pub [u8; 64]);

impl DeviceSignature {
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for DeviceSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Serde helper for fixed-size byte arrays as hex strings
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; N];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)
            .map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}

/// Serde helper for variable-length byte vectors as hex strings
pub mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for lists of byte vectors as hex strings
pub mod hex_vec_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        items
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Serde helper for lists of 32-byte keys as base-58 strings (Solana convention)
pub mod base58_keys {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(keys: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        keys.iter()
            .map(|k| bs58::encode(k).into_string())
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| {
                let bytes = bs58::decode(s)
                    .into_vec()
                    .map_err(serde::de::Error::custom)?;
                bytes.as_slice().try_into().map_err(|_| {
                    serde::de::Error::custom(format!("expected 32-byte key, got {}", bytes.len()))
                })
            })
            .collect()
    }
}

/// Serde helper for a single 32-byte value as a base-58 string
pub mod base58_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&bs58::encode(bytes).into_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = bs58::decode(&s)
            .into_vec()
            .map_err(serde::de::Error::custom)?;
        bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!("expected 32 bytes, got {}", bytes.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_base58_roundtrip() {
        let key = DevicePublicKey::new([7u8; 32]);
        let encoded = key.to_base58();
        assert_eq!(DevicePublicKey::from_base58(&encoded).unwrap(), key);
        assert_eq!(encoded.parse::<DevicePublicKey>().unwrap(), key);
    }

    #[test]
    fn test_device_key_rejects_wrong_length() {
        let short = bs58::encode([1u8; 31]).into_string();
        assert!(matches!(
            DevicePublicKey::from_base58(&short),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_device_key_serializes_as_base58_string() {
        let key = DevicePublicKey::new([9u8; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_base58()));
    }
}
