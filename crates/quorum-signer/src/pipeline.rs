//! Approval signing pipeline
//!
//! Turns an [`ApprovalRequest`] into a [`SignedApproval`] in five stages:
//!
//! 1. `Received`: shape checks on the request
//! 2. `KeyResolved`: load the root secret once and derive a key per target
//! 3. `Serialized`: canonical bytes per target
//! 4. `Signed`: chain signatures, then the device attestation over the digest
//! 5. `Packaged`: assemble the outbound artifact
//!
//! A failure at any stage aborts the whole request; partial signature sets
//! are never returned.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use quorum_core::types::{hex_array, hex_vec, hex_vec_list};
use quorum_core::{
    ApprovalRequest, Chain, ChainKeyPair, DevicePublicKey, DeviceSignature, RequestKind,
    SerializedPayload,
};

use crate::device::DeviceSigner;
use crate::error::{CustodyError, Result};
use crate::vault::KeyVault;

/// Pipeline stage, reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalStage {
    Received,
    KeyResolved,
    Serialized,
    Signed,
    Packaged,
}

impl fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApprovalStage::Received => "received",
            ApprovalStage::KeyResolved => "key-resolved",
            ApprovalStage::Serialized => "serialized",
            ApprovalStage::Signed => "signed",
            ApprovalStage::Packaged => "packaged",
        };
        f.write_str(name)
    }
}

/// Signatures for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSignature {
    pub chain: Chain,
    pub derivation_index: u32,
    pub address: String,
    #[serde(with = "hex_vec")]
    pub public_key: Vec<u8>,
    /// Serialized bytes that were signed, one per segment
    #[serde(with = "hex_vec_list")]
    pub payloads: Vec<Vec<u8>>,
    /// One signature per payload segment
    #[serde(with = "hex_vec_list")]
    pub signatures: Vec<Vec<u8>>,
}

/// Outbound artifact of a successful approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedApproval {
    pub request_id: String,
    pub kind: String,
    pub chain_signatures: Vec<ChainSignature>,
    pub device_public_key: DevicePublicKey,
    pub device_signature: DeviceSignature,
    #[serde(with = "hex_array")]
    pub request_digest: [u8; 32],
    pub signed_at: DateTime<Utc>,
}

impl SignedApproval {
    /// Check the device attestation over the request digest
    pub fn verify_device_signature(&self) -> Result<()> {
        Ok(self
            .device_public_key
            .verify(&self.request_digest, &self.device_signature)?)
    }
}

/// Signs approval requests for one account and device
pub struct ApprovalSigner {
    vault: Arc<KeyVault>,
    device: Arc<dyn DeviceSigner>,
}

impl fmt::Debug for ApprovalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalSigner")
            .field("vault", &self.vault)
            .field("device", &self.device.public_key())
            .finish()
    }
}

fn at(stage: ApprovalStage) -> impl FnOnce(CustodyError) -> CustodyError {
    move |cause| CustodyError::ApprovalSigning {
        stage,
        cause: Box::new(cause),
    }
}

impl ApprovalSigner {
    pub fn new(vault: Arc<KeyVault>, device: Arc<dyn DeviceSigner>) -> Self {
        Self { vault, device }
    }

    /// Run the full pipeline for `request`
    #[instrument(skip_all, fields(request = %request.id, kind = request.kind.name()))]
    pub async fn sign(&self, request: &ApprovalRequest) -> Result<SignedApproval> {
        debug!(stage = %ApprovalStage::Received, "Validating request");
        request
            .validate()
            .map_err(|e| at(ApprovalStage::Received)(e.into()))?;

        let keys = self
            .resolve_keys(request)
            .await
            .map_err(at(ApprovalStage::KeyResolved))?;
        debug!(stage = %ApprovalStage::KeyResolved, keys = keys.len(), "Keys derived");

        let payloads = request
            .targets()
            .iter()
            .zip(&keys)
            .map(|(target, key)| target.serialize_for(key.public()))
            .collect::<quorum_core::Result<Vec<SerializedPayload>>>()
            .map_err(|e| at(ApprovalStage::Serialized)(e.into()))?;
        debug!(stage = %ApprovalStage::Serialized, payloads = payloads.len(), "Targets serialized");

        let signatures = payloads
            .iter()
            .zip(&keys)
            .map(|(payload, key)| payload.sign(key))
            .collect::<quorum_core::Result<Vec<_>>>()
            .map_err(|e| at(ApprovalStage::Signed)(e.into()))?;
        let digest = request.digest(&payloads);
        let device_signature = self
            .device
            .sign(&digest)
            .await
            .map_err(|e| at(ApprovalStage::Signed)(CustodyError::SigningFailure(Box::new(e))))?;
        debug!(stage = %ApprovalStage::Signed, "Payloads signed");

        let network = self.vault.config().bitcoin_network;
        let chain_signatures = keys
            .iter()
            .zip(payloads)
            .zip(signatures)
            .map(|((key, payload), signatures)| {
                Ok(ChainSignature {
                    chain: key.chain(),
                    derivation_index: key.index(),
                    address: key.public().address_for(network)?,
                    public_key: key.public().public_key.clone(),
                    payloads: payload.segments,
                    signatures,
                })
            })
            .collect::<quorum_core::Result<Vec<_>>>()
            .map_err(|e| at(ApprovalStage::Packaged)(e.into()))?;

        info!(targets = chain_signatures.len(), "Approval signed");
        Ok(SignedApproval {
            request_id: request.id.clone(),
            kind: request.kind.name().to_string(),
            chain_signatures,
            device_public_key: self.device.public_key(),
            device_signature,
            request_digest: digest,
            signed_at: Utc::now(),
        })
    }

    /// One key per target, from a single root secret load
    async fn resolve_keys(&self, request: &ApprovalRequest) -> Result<Vec<ChainKeyPair>> {
        let targets = request.targets();
        if targets.is_empty() {
            debug_assert!(matches!(request.kind, RequestKind::Login { .. }));
            return Ok(Vec::new());
        }

        let root = self
            .vault
            .load_root_secret()
            .await
            .map_err(|e| CustodyError::DerivationFailure(Box::new(e)))?;
        targets
            .iter()
            .map(|target| root.derive(target.chain(), target.derivation_index()))
            .collect::<quorum_core::Result<Vec<_>>>()
            .map_err(|e| CustodyError::DerivationFailure(Box::new(e.into())))
    }
}
