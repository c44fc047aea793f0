//! Signers info assembly
//!
//! Binds a sharding policy to the account's root secret and attests the
//! binding with the device key.

use tracing::{info, instrument};

use quorum_core::{compute_commitment, DevicePublicKey, ShardingPolicy, SignersInfo};

use crate::device::DeviceSigner;
use crate::error::{CustodyError, Result};
use crate::vault::KeyVault;

/// Build the signed [`SignersInfo`] for `policy`
///
/// Fails with `InvalidPolicy` before touching the store, `DerivationFailure`
/// when the root secret cannot be loaded, and `SigningFailure` when the device
/// key cannot sign.
#[instrument(skip_all, fields(revision = %policy.policy_revision_guid, account = %vault.account()))]
pub async fn build_signers_info(
    policy: ShardingPolicy,
    vault: &KeyVault,
    device: &dyn DeviceSigner,
) -> Result<SignersInfo> {
    policy.validate()?;

    let root = vault
        .load_root_secret()
        .await
        .map_err(|e| CustodyError::DerivationFailure(Box::new(e)))?;
    let commitment = compute_commitment(&policy, &root)
        .map_err(|e| CustodyError::DerivationFailure(Box::new(e.into())))?;
    drop(root);

    let signature = device
        .sign(&commitment)
        .await
        .map_err(|e| CustodyError::SigningFailure(Box::new(e)))?;

    info!(commitment = %hex::encode(commitment), "Built signers info");
    Ok(SignersInfo::new(policy, commitment, device.public_key(), signature))
}

/// Enroll `device` into `policy` and build the signers info for the result
///
/// Applies the bootstrap reduction for `participant_id` first; see
/// [`quorum_core::apply_bootstrap_reduction`].
#[instrument(skip_all, fields(participant = participant_id, bootstrap = ?bootstrap_participant_id))]
pub async fn enroll_device(
    policy: &ShardingPolicy,
    participant_id: &str,
    bootstrap_participant_id: Option<&str>,
    vault: &KeyVault,
    device: &dyn DeviceSigner,
) -> Result<SignersInfo> {
    let device_key: DevicePublicKey = device.public_key();
    let reduced = policy.apply_bootstrap_reduction(participant_id, device_key, bootstrap_participant_id)?;
    build_signers_info(reduced, vault, device).await
}
