//! Quorum Core - Key derivation, sharding policies, and approval serialization
//!
//! This crate holds the pure half of the Quorum custody core: everything here is
//! deterministic, synchronous, and free of storage or network access.
//!
//! - [`hd`]: BIP-32 (secp256k1) and SLIP-10 (Ed25519) derivation primitives
//! - [`chain`]: per-chain key pairs derived from a [`RootSecret`]
//! - [`policy`]: sharding policy validation and the bootstrap reduction rule
//! - [`signers`]: the commitment binding a policy to a root secret
//! - [`approval`]: approval request types and per-chain canonical serialization

pub mod address;
pub mod approval;
pub mod chain;
pub mod crypto;
pub mod error;
pub mod hd;
pub mod policy;
pub mod secret;
pub mod signers;
pub mod types;

pub use address::BitcoinNetwork;
pub use approval::{ApprovalRequest, RequestKind, SerializedPayload, SigningTarget};
pub use chain::{derive_chain_key_pair, Chain, ChainKeyPair, ChainPublicKey};
pub use error::{Error, Result};
pub use hd::{Curve, DerivationPath, PathComponent};
pub use policy::{apply_bootstrap_reduction, ShardingParticipant, ShardingPolicy};
pub use secret::{RootSecret, ROOT_SECRET_LEN};
pub use signers::{compute_commitment, SignersInfo};
pub use types::{DevicePublicKey, DeviceSignature};
