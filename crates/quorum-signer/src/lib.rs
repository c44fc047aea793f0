//! Quorum Signer - Device-side custody operations
//!
//! Everything in this crate touches the secret store and may suspend on a user
//! presence prompt:
//!
//! - [`store`]: the injected secret store capability and its adapters
//! - [`device`]: the per-device Ed25519 identity
//! - [`vault`]: root secret access, legacy migration, derived key cache
//! - [`signers`]: signed signers info for a sharding policy
//! - [`pipeline`]: the approval signing state machine

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod signers;
pub mod store;
pub mod vault;

pub use config::SignerConfig;
pub use device::{DeviceIdentity, DeviceSigner};
pub use error::{CustodyError, Result};
pub use pipeline::{ApprovalSigner, ApprovalStage, ChainSignature, SignedApproval};
pub use signers::{build_signers_info, enroll_device};
pub use store::{
    AlwaysPresent, FileSecretStore, KdfParams, MemorySecretStore, PresenceGate, PresenceOutcome,
    SecretStore, StaticPresence, UserPresence,
};
pub use vault::{KeyVault, MigrationOutcome};
