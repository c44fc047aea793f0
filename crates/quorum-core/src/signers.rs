//! Commitment binding a sharding policy to a root secret

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::policy::ShardingPolicy;
use crate::secret::RootSecret;
use crate::types::{DevicePublicKey, DeviceSignature};

type HmacSha256 = Hmac<Sha256>;

const COMMITMENT_INFO: &[u8] = b"quorum/signers-info/commitment/v1";

/// Keyed digest of the policy's canonical bytes
///
/// The key is expanded from the root secret with HKDF-SHA256, so the
/// commitment is reproducible by the secret holder and reveals nothing about it.
pub fn compute_commitment(policy: &ShardingPolicy, root_secret: &RootSecret) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, root_secret.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(COMMITMENT_INFO, &mut key[..])
        .map_err(|e| Error::Crypto(format!("HKDF expand failed: {}", e)))?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&key[..])
        .map_err(|e| Error::Crypto(format!("HMAC init failed: {}", e)))?;
    mac.update(&policy.canonical_bytes());
    Ok(mac.finalize().into_bytes().into())
}

/// Signed artifact registering a policy against a root secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignersInfo {
    pub sharding_policy: ShardingPolicy,
    #[serde(with = "crate::types::hex_array")]
    pub root_secret_commitment: [u8; 32],
    pub device_public_key: DevicePublicKey,
    pub device_signature: DeviceSignature,
}

impl SignersInfo {
    pub fn new(
        sharding_policy: ShardingPolicy,
        root_secret_commitment: [u8; 32],
        device_public_key: DevicePublicKey,
        device_signature: DeviceSignature,
    ) -> Self {
        Self {
            sharding_policy,
            root_secret_commitment,
            device_public_key,
            device_signature,
        }
    }

    /// Check the device signature over the commitment
    pub fn verify_device_signature(&self) -> Result<()> {
        self.device_public_key
            .verify(&self.root_secret_commitment, &self.device_signature)
    }

    /// Recompute the commitment from `root_secret` and check both bindings
    pub fn verify(&self, root_secret: &RootSecret) -> Result<()> {
        let expected = compute_commitment(&self.sharding_policy, root_secret)?;
        if !bool::from(expected.ct_eq(&self.root_secret_commitment)) {
            return Err(Error::SignatureVerificationFailed);
        }
        self.verify_device_signature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ShardingParticipant;
    use ed25519_dalek::Signer;

    fn policy(device: u8) -> ShardingPolicy {
        ShardingPolicy::new(
            "rev-1",
            1,
            vec![
                ShardingParticipant::new("A", [DevicePublicKey::new([device; 32])]),
                ShardingParticipant::new("B", [DevicePublicKey::new([2; 32])]),
            ],
        )
        .unwrap()
    }

    fn signed(policy: ShardingPolicy, root: &RootSecret) -> SignersInfo {
        let device = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let commitment = compute_commitment(&policy, root).unwrap();
        let signature = device.sign(&commitment).to_bytes();
        SignersInfo::new(
            policy,
            commitment,
            DevicePublicKey::new(device.verifying_key().to_bytes()),
            DeviceSignature::new(signature),
        )
    }

    #[test]
    fn test_commitment_is_deterministic() {
        let root = RootSecret::from_bytes(&[1u8; 64]).unwrap();
        assert_eq!(
            compute_commitment(&policy(1), &root).unwrap(),
            compute_commitment(&policy(1), &root).unwrap()
        );
    }

    #[test]
    fn test_commitment_binds_policy() {
        let root = RootSecret::from_bytes(&[1u8; 64]).unwrap();
        assert_ne!(
            compute_commitment(&policy(1), &root).unwrap(),
            compute_commitment(&policy(9), &root).unwrap()
        );
    }

    #[test]
    fn test_commitment_binds_root_secret() {
        let a = RootSecret::from_bytes(&[1u8; 64]).unwrap();
        let b = RootSecret::from_bytes(&[2u8; 64]).unwrap();
        assert_ne!(
            compute_commitment(&policy(1), &a).unwrap(),
            compute_commitment(&policy(1), &b).unwrap()
        );
    }

    #[test]
    fn test_verify_accepts_and_rejects() {
        let root = RootSecret::from_bytes(&[1u8; 64]).unwrap();
        let info = signed(policy(1), &root);
        info.verify(&root).unwrap();

        let other = RootSecret::from_bytes(&[3u8; 64]).unwrap();
        assert!(info.verify(&other).is_err());

        let mut tampered = info.clone();
        tampered.sharding_policy = policy(9);
        assert!(tampered.verify(&root).is_err());

        let mut forged = info;
        forged.device_signature = DeviceSignature::new([0u8; 64]);
        assert!(forged.verify_device_signature().is_err());
    }

    #[test]
    fn test_json_encodes_commitment_as_hex() {
        let root = RootSecret::from_bytes(&[1u8; 64]).unwrap();
        let info = signed(policy(1), &root);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json["rootSecretCommitment"],
            hex::encode(info.root_secret_commitment)
        );
        let back: SignersInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }
}
