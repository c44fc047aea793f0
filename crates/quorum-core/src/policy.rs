//! Sharding policy validation and transformation
//!
//! A [`ShardingPolicy`] declares which device keys may act for each logical
//! participant and how many participants must approve. The engine validates
//! policies, applies the bootstrap reduction used at enrollment, and performs
//! the structural edits that mint a new revision guid.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::DevicePublicKey;

/// Domain tag prefixed to the canonical policy encoding
const CANONICAL_DOMAIN: &[u8] = b"quorum.sharding-policy.v1";

/// A logical participant and the device keys authorized to act for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardingParticipant {
    pub participant_id: String,
    pub device_public_keys: BTreeSet<DevicePublicKey>,
}

impl ShardingParticipant {
    pub fn new(
        participant_id: impl Into<String>,
        device_public_keys: impl IntoIterator<Item = DevicePublicKey>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            device_public_keys: device_public_keys.into_iter().collect(),
        }
    }
}

/// Threshold policy over participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardingPolicy {
    /// Optimistic-concurrency token for policy updates
    pub policy_revision_guid: String,
    pub threshold: u32,
    pub participants: Vec<ShardingParticipant>,
}

impl ShardingPolicy {
    /// Build and validate a policy
    pub fn new(
        policy_revision_guid: impl Into<String>,
        threshold: u32,
        participants: Vec<ShardingParticipant>,
    ) -> Result<Self> {
        let policy = Self {
            policy_revision_guid: policy_revision_guid.into(),
            threshold,
            participants,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(Error::InvalidPolicy("threshold must be at least 1".to_string()));
        }
        if self.threshold as usize > self.participants.len() {
            return Err(Error::InvalidPolicy(format!(
                "threshold {} exceeds participant count {}",
                self.threshold,
                self.participants.len()
            )));
        }

        let mut seen = HashSet::new();
        for participant in &self.participants {
            if !seen.insert(participant.participant_id.as_str()) {
                return Err(Error::InvalidPolicy(format!(
                    "duplicate participant id {}",
                    participant.participant_id
                )));
            }
            if participant.device_public_keys.is_empty() {
                return Err(Error::InvalidPolicy(format!(
                    "participant {} has no device keys",
                    participant.participant_id
                )));
            }
        }
        Ok(())
    }

    pub fn participant(&self, participant_id: &str) -> Option<&ShardingParticipant> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    /// Whether `device` may act for `participant_id`
    pub fn authorizes(&self, participant_id: &str, device: &DevicePublicKey) -> bool {
        self.participant(participant_id)
            .map(|p| p.device_public_keys.contains(device))
            .unwrap_or(false)
    }

    /// Deterministic binary encoding of the exact policy content
    ///
    /// Every variable-length field is prefixed with its u32 big-endian length.
    /// Participant order is preserved; device keys are emitted in set order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bytes(&mut out, CANONICAL_DOMAIN);
        put_bytes(&mut out, self.policy_revision_guid.as_bytes());
        out.extend_from_slice(&self.threshold.to_be_bytes());
        out.extend_from_slice(&(self.participants.len() as u32).to_be_bytes());
        for participant in &self.participants {
            put_bytes(&mut out, participant.participant_id.as_bytes());
            out.extend_from_slice(&(participant.device_public_keys.len() as u32).to_be_bytes());
            for key in &participant.device_public_keys {
                out.extend_from_slice(key.as_bytes());
            }
        }
        out
    }

    /// See [`apply_bootstrap_reduction`]
    pub fn apply_bootstrap_reduction(
        &self,
        participant_id: &str,
        new_device_key: DevicePublicKey,
        bootstrap_participant_id: Option<&str>,
    ) -> Result<Self> {
        apply_bootstrap_reduction(self, participant_id, new_device_key, bootstrap_participant_id)
    }

    /// Append a participant; revises the policy
    pub fn add_participant(&self, participant: ShardingParticipant) -> Result<Self> {
        let mut next = self.clone();
        next.participants.push(participant);
        next.revise()
    }

    /// Remove a participant by id; revises the policy
    pub fn remove_participant(&self, participant_id: &str) -> Result<Self> {
        let mut next = self.clone();
        let before = next.participants.len();
        next.participants.retain(|p| p.participant_id != participant_id);
        if next.participants.len() == before {
            return Err(Error::InvalidPolicy(format!(
                "unknown participant {}",
                participant_id
            )));
        }
        next.revise()
    }

    /// Change the threshold; revises the policy
    pub fn set_threshold(&self, threshold: u32) -> Result<Self> {
        let mut next = self.clone();
        next.threshold = threshold;
        next.revise()
    }

    /// Swap one device key of a participant for another; revises the policy
    pub fn rotate_device_key(
        &self,
        participant_id: &str,
        old_key: &DevicePublicKey,
        new_key: DevicePublicKey,
    ) -> Result<Self> {
        let mut next = self.clone();
        let participant = next
            .participants
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
            .ok_or_else(|| {
                Error::InvalidPolicy(format!("unknown participant {}", participant_id))
            })?;
        if !participant.device_public_keys.remove(old_key) {
            return Err(Error::InvalidPolicy(format!(
                "device {} is not authorized for {}",
                old_key, participant_id
            )));
        }
        participant.device_public_keys.insert(new_key);
        next.revise()
    }

    fn revise(mut self) -> Result<Self> {
        self.validate()?;
        self.policy_revision_guid = uuid::Uuid::new_v4().to_string();
        Ok(self)
    }
}

/// Reduce a policy for the enrollment of `new_device_key` by `participant_id`
///
/// With a bootstrap participant: the threshold becomes 1, the bootstrap
/// participant is removed, and the enrolling participant's keys are replaced by
/// the single new key. Without one, only the key replacement applies. An
/// unknown `participant_id` is left alone. The result must still satisfy
/// `threshold <= participants.len()`, otherwise `InvalidPolicy` is returned.
pub fn apply_bootstrap_reduction(
    policy: &ShardingPolicy,
    participant_id: &str,
    new_device_key: DevicePublicKey,
    bootstrap_participant_id: Option<&str>,
) -> Result<ShardingPolicy> {
    let mut reduced = policy.clone();

    if let Some(bootstrap_id) = bootstrap_participant_id {
        reduced.threshold = 1;
        reduced.participants.retain(|p| p.participant_id != bootstrap_id);
    }

    if let Some(participant) = reduced
        .participants
        .iter_mut()
        .find(|p| p.participant_id == participant_id)
    {
        participant.device_public_keys = BTreeSet::from([new_device_key]);
    }

    reduced.validate()?;
    Ok(reduced)
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}
