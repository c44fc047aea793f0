//! Approval requests and their per-chain canonical serialization
//!
//! An [`ApprovalRequest`] names what the user is approving. Every kind except
//! `Login` carries one or more [`SigningTarget`]s; each target serializes into
//! a [`SerializedPayload`] of chain-specific bytes that the matching chain key
//! signs.

pub mod bitcoin;
pub mod ethereum;
pub mod solana;

use serde::{Deserialize, Serialize};

use crate::chain::{Chain, ChainKeyPair, ChainPublicKey};
use crate::crypto::{double_sha256, keccak256, sha256_multi};
use crate::error::{Error, Result};

pub use bitcoin::{BitcoinTransaction, TxInput, TxOutput, SIGHASH_ALL};
pub use ethereum::{EvmSafeTransaction, SafeOperation};
pub use solana::{CompiledInstruction, MessageHeader, SolanaMessage};

const REQUEST_DIGEST_DOMAIN: &[u8] = b"quorum.approval-request.v2";

/// A request the device is asked to approve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    #[serde(flatten)]
    pub kind: RequestKind,
}

/// Approval request kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequestKind {
    /// Move funds out of a wallet
    Withdrawal { target: SigningTarget },
    /// Deploy or register a new wallet
    WalletCreation { target: SigningTarget },
    /// Policy change affecting one or more chains
    PolicyChange { targets: Vec<SigningTarget> },
    /// Signer set update affecting one or more chains
    SignersUpdate { targets: Vec<SigningTarget> },
    /// Device attestation over a backend challenge; no chain key involved
    Login {
        #[serde(with = "crate::types::hex_vec")]
        challenge: Vec<u8>,
    },
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Withdrawal { .. } => "withdrawal",
            RequestKind::WalletCreation { .. } => "walletCreation",
            RequestKind::PolicyChange { .. } => "policyChange",
            RequestKind::SignersUpdate { .. } => "signersUpdate",
            RequestKind::Login { .. } => "login",
        }
    }

    /// Single-byte tag used in the request digest
    pub fn tag(&self) -> u8 {
        match self {
            RequestKind::Withdrawal { .. } => 0x01,
            RequestKind::WalletCreation { .. } => 0x02,
            RequestKind::PolicyChange { .. } => 0x03,
            RequestKind::SignersUpdate { .. } => 0x04,
            RequestKind::Login { .. } => 0x05,
        }
    }

    /// Chain targets this request must be signed for
    pub fn targets(&self) -> &[SigningTarget] {
        match self {
            RequestKind::Withdrawal { target } | RequestKind::WalletCreation { target } => {
                std::slice::from_ref(target)
            }
            RequestKind::PolicyChange { targets } | RequestKind::SignersUpdate { targets } => {
                targets
            }
            RequestKind::Login { .. } => &[],
        }
    }
}

impl ApprovalRequest {
    pub fn new(id: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn targets(&self) -> &[SigningTarget] {
        self.kind.targets()
    }

    /// Shape checks that need no key material
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Serialization("request id is empty".to_string()));
        }
        match &self.kind {
            RequestKind::PolicyChange { targets } | RequestKind::SignersUpdate { targets }
                if targets.is_empty() =>
            {
                Err(Error::Serialization(format!(
                    "{} request has no targets",
                    self.kind.name()
                )))
            }
            RequestKind::Login { challenge } if challenge.is_empty() => {
                Err(Error::Serialization("login challenge is empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// SHA-256 digest the device key attests to
    ///
    /// Covers the request id, its kind, the login challenge (if any), the chain
    /// and derivation index of every target, and every serialized payload in
    /// target order.
    pub fn digest(&self, payloads: &[SerializedPayload]) -> [u8; 32] {
        let mut parts: Vec<Vec<u8>> = Vec::new();
        parts.push(REQUEST_DIGEST_DOMAIN.to_vec());
        parts.push(length_prefixed(self.id.as_bytes()));
        parts.push(vec![self.kind.tag()]);
        if let RequestKind::Login { challenge } = &self.kind {
            parts.push(length_prefixed(challenge));
        }
        let targets = self.targets();
        parts.push((targets.len() as u32).to_be_bytes().to_vec());
        for target in targets {
            parts.push(vec![target.chain().tag()]);
            parts.push(target.derivation_index().to_be_bytes().to_vec());
        }
        parts.push((payloads.len() as u32).to_be_bytes().to_vec());
        for payload in payloads {
            parts.push(vec![payload.chain.tag()]);
            parts.push((payload.segments.len() as u32).to_be_bytes().to_vec());
            for segment in &payload.segments {
                parts.push(length_prefixed(segment));
            }
        }

        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        sha256_multi(&refs)
    }
}

/// A chain-specific item to be signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "chain", rename_all = "lowercase")]
pub enum SigningTarget {
    Ethereum(EvmSafeTransaction),
    Solana(SolanaMessage),
    Bitcoin(BitcoinTransaction),
}

impl SigningTarget {
    pub fn chain(&self) -> Chain {
        match self {
            SigningTarget::Ethereum(_) => Chain::Ethereum,
            SigningTarget::Solana(_) => Chain::Solana,
            SigningTarget::Bitcoin(_) => Chain::Bitcoin,
        }
    }

    pub fn derivation_index(&self) -> u32 {
        match self {
            SigningTarget::Ethereum(tx) => tx.derivation_index,
            SigningTarget::Solana(msg) => msg.derivation_index,
            SigningTarget::Bitcoin(tx) => tx.derivation_index,
        }
    }

    /// Canonical bytes for `key` to sign
    pub fn serialize_for(&self, key: &ChainPublicKey) -> Result<SerializedPayload> {
        if key.chain != self.chain() {
            return Err(Error::Serialization(format!(
                "{} target cannot be signed by a {} key",
                self.chain(),
                key.chain
            )));
        }

        let segments = match self {
            SigningTarget::Ethereum(tx) => vec![tx.encode_eip712()?.to_vec()],
            SigningTarget::Solana(msg) => vec![msg.serialize_for(key)?],
            SigningTarget::Bitcoin(tx) => tx.sighash_preimages(key)?,
        };

        Ok(SerializedPayload {
            chain: self.chain(),
            segments,
        })
    }
}

/// Serialized bytes for one target
///
/// Account-model chains produce one segment; Bitcoin produces one BIP-143
/// preimage per input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPayload {
    pub chain: Chain,
    pub segments: Vec<Vec<u8>>,
}

impl SerializedPayload {
    /// Sign every segment with `key`
    ///
    /// - Ethereum: recoverable ECDSA over Keccak-256 of the segment (65 bytes)
    /// - Solana: Ed25519 over the message bytes (64 bytes)
    /// - Bitcoin: low-S DER ECDSA over the double SHA-256 sighash, plus the
    ///   sighash type byte
    pub fn sign(&self, key: &ChainKeyPair) -> Result<Vec<Vec<u8>>> {
        if key.chain() != self.chain {
            return Err(Error::Crypto(format!(
                "{} payload cannot be signed by a {} key",
                self.chain,
                key.chain()
            )));
        }

        self.segments
            .iter()
            .map(|segment| match self.chain {
                Chain::Ethereum => Ok(key.sign_prehash_recoverable(&keccak256(segment))?.to_vec()),
                Chain::Solana => Ok(key.sign_ed25519(segment)?.to_vec()),
                Chain::Bitcoin => {
                    let mut sig = key.sign_prehash_der(&double_sha256(segment))?;
                    sig.push(SIGHASH_ALL as u8);
                    Ok(sig)
                }
            })
            .collect()
    }
}

pub(crate) fn length_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(challenge: &[u8]) -> ApprovalRequest {
        ApprovalRequest::new(
            "req-1",
            RequestKind::Login {
                challenge: challenge.to_vec(),
            },
        )
    }

    #[test]
    fn test_login_has_no_targets() {
        let request = login(b"nonce");
        assert!(request.targets().is_empty());
        request.validate().unwrap();
    }

    #[test]
    fn test_empty_multi_chain_request_rejected() {
        let request = ApprovalRequest::new("req-1", RequestKind::PolicyChange { targets: vec![] });
        assert!(request.validate().is_err());
        assert!(login(b"").validate().is_err());
    }

    #[test]
    fn test_digest_depends_on_id_and_challenge() {
        let a = login(b"nonce");
        let mut b = a.clone();
        b.id = "req-2".to_string();
        let c = login(b"other");
        assert_eq!(a.digest(&[]), login(b"nonce").digest(&[]));
        assert_ne!(a.digest(&[]), b.digest(&[]));
        assert_ne!(a.digest(&[]), c.digest(&[]));
    }

    #[test]
    fn test_digest_covers_payloads() {
        let request = login(b"nonce");
        let payload = SerializedPayload {
            chain: Chain::Solana,
            segments: vec![vec![1, 2, 3]],
        };
        assert_ne!(request.digest(&[]), request.digest(&[payload]));
    }

    fn withdrawal(derivation_index: u32) -> ApprovalRequest {
        ApprovalRequest::new(
            "req-1",
            RequestKind::Withdrawal {
                target: SigningTarget::Ethereum(EvmSafeTransaction {
                    derivation_index,
                    chain_id: 1,
                    safe_address: [0x5a; 20],
                    to: [0xd8; 20],
                    value: 1_000,
                    data: Vec::new(),
                    operation: SafeOperation::Call,
                    safe_tx_gas: 0,
                    base_gas: 0,
                    gas_price: 0,
                    gas_token: [0u8; 20],
                    refund_receiver: [0u8; 20],
                    nonce: 3,
                }),
            },
        )
    }

    #[test]
    fn test_digest_binds_derivation_index() {
        // The Safe encoding does not depend on the signing key, so both
        // requests produce identical payload bytes
        let payload = SerializedPayload {
            chain: Chain::Ethereum,
            segments: vec![vec![0x19, 0x01]],
        };
        let first = withdrawal(0);
        let second = withdrawal(7);
        assert_eq!(first.digest(&[payload.clone()]), withdrawal(0).digest(&[payload.clone()]));
        assert_ne!(first.digest(&[payload.clone()]), second.digest(&[payload]));
    }

    #[test]
    fn test_request_json_is_tagged() {
        let json = serde_json::to_value(login(&[0xab, 0xcd])).unwrap();
        assert_eq!(json["id"], "req-1");
        assert_eq!(json["type"], "login");
        assert_eq!(json["challenge"], "abcd");

        let back: ApprovalRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, login(&[0xab, 0xcd]));
    }
}
