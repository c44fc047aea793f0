//! Secure secret store capability
//!
//! The custody core never reaches for a global keychain. Every component that
//! needs secrets receives an `Arc<dyn SecretStore>`, keyed by an opaque account
//! identifier and a service namespace. Entries saved as biometry-protected are
//! only released after a [`UserPresence`] confirmation.

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::SignerConfig;
use crate::error::{CustodyError, Result};

pub use file::{FileSecretStore, KdfParams};
pub use memory::MemorySecretStore;

/// Service namespaces, appended to the configured prefix
pub mod namespace {
    /// Root secret (biometry-protected)
    pub const ROOT_SECRET: &str = "root-secret";
    /// Device Ed25519 private key (biometry-protected)
    pub const DEVICE_KEY: &str = "device-key";
    /// Device public key cache
    pub const DEVICE_PUBLIC_KEY: &str = "device-public-key";
    /// Derived chain public key cache, cleared when the root secret changes
    pub const DERIVED_PUBLIC_KEYS: &str = "derived-public-keys";
}

/// Account-scoped secret storage
///
/// Absence is `Ok(None)`; a failed read is an error, never empty data.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn save(
        &self,
        account: &str,
        service: &str,
        data: &[u8],
        biometry_protected: bool,
    ) -> Result<()>;

    /// May suspend on a presence prompt for protected entries
    async fn load(&self, account: &str, service: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Removing an absent entry is not an error
    async fn clear(&self, account: &str, service: &str) -> Result<()>;

    async fn contains(&self, account: &str, service: &str) -> Result<bool>;
}

/// Outcome of a user presence prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    Confirmed,
    Denied,
    Cancelled,
}

/// Biometric or passcode prompt supplied by the host
#[async_trait]
pub trait UserPresence: Send + Sync {
    async fn confirm(&self, reason: &str) -> PresenceOutcome;
}

/// Presence provider that confirms immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPresent;

#[async_trait]
impl UserPresence for AlwaysPresent {
    async fn confirm(&self, _reason: &str) -> PresenceOutcome {
        PresenceOutcome::Confirmed
    }
}

/// Presence provider with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticPresence(pub PresenceOutcome);

#[async_trait]
impl UserPresence for StaticPresence {
    async fn confirm(&self, _reason: &str) -> PresenceOutcome {
        self.0
    }
}

/// A presence provider bounded by a timeout
#[derive(Clone)]
pub struct PresenceGate {
    presence: Arc<dyn UserPresence>,
    timeout: Duration,
}

impl PresenceGate {
    pub fn new(presence: Arc<dyn UserPresence>, timeout: Duration) -> Self {
        Self { presence, timeout }
    }

    pub fn from_config(presence: Arc<dyn UserPresence>, config: &SignerConfig) -> Self {
        Self::new(presence, config.presence_timeout())
    }

    /// Suspend until the prompt resolves
    ///
    /// Denial, cancellation and timeout all yield `UserPresenceRequired`.
    pub async fn require(&self, reason: &str) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.presence.confirm(reason)).await {
            Ok(PresenceOutcome::Confirmed) => {
                debug!(reason, "User presence confirmed");
                Ok(())
            }
            Ok(outcome) => {
                debug!(reason, ?outcome, "User presence not confirmed");
                Err(CustodyError::UserPresenceRequired)
            }
            Err(_) => {
                warn!(reason, timeout_secs = self.timeout.as_secs_f64(), "User presence prompt timed out");
                Err(CustodyError::UserPresenceRequired)
            }
        }
    }
}

impl Default for PresenceGate {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysPresent), Duration::from_secs(60))
    }
}

impl std::fmt::Debug for PresenceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceGate")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAnswers;

    #[async_trait]
    impl UserPresence for NeverAnswers {
        async fn confirm(&self, _reason: &str) -> PresenceOutcome {
            tokio::time::sleep(Duration::from_secs(30)).await;
            PresenceOutcome::Confirmed
        }
    }

    #[tokio::test]
    async fn test_confirmed_presence_passes() {
        PresenceGate::default().require("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_denied_and_cancelled_require_presence() {
        for outcome in [PresenceOutcome::Denied, PresenceOutcome::Cancelled] {
            let gate = PresenceGate::new(Arc::new(StaticPresence(outcome)), Duration::from_secs(1));
            let err = gate.require("test").await.unwrap_err();
            assert!(matches!(err, CustodyError::UserPresenceRequired));
        }
    }

    #[tokio::test]
    async fn test_timeout_requires_presence() {
        let gate = PresenceGate::new(Arc::new(NeverAnswers), Duration::from_millis(20));
        let err = gate.require("test").await.unwrap_err();
        assert!(err.requires_user_presence());
    }
}
