//! In-memory secret store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::instrument;
use zeroize::Zeroizing;

use super::{PresenceGate, SecretStore};
use crate::error::Result;

struct Entry {
    data: Zeroizing<Vec<u8>>,
    biometry_protected: bool,
}

/// Process-local store, used by tests and ephemeral sessions
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<(String, String), Entry>>,
    gate: PresenceGate,
}

impl MemorySecretStore {
    pub fn new(gate: PresenceGate) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gate,
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    #[instrument(skip(self, data))]
    async fn save(
        &self,
        account: &str,
        service: &str,
        data: &[u8],
        biometry_protected: bool,
    ) -> Result<()> {
        let entry = Entry {
            data: Zeroizing::new(data.to_vec()),
            biometry_protected,
        };
        self.entries
            .write()
            .await
            .insert((account.to_string(), service.to_string()), entry);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, account: &str, service: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let key = (account.to_string(), service.to_string());
        let protected = match self.entries.read().await.get(&key) {
            Some(entry) => entry.biometry_protected,
            None => return Ok(None),
        };

        if protected {
            self.gate.require(service).await?;
        }

        Ok(self
            .entries
            .read()
            .await
            .get(&key)
            .map(|entry| entry.data.clone()))
    }

    #[instrument(skip(self))]
    async fn clear(&self, account: &str, service: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .remove(&(account.to_string(), service.to_string()));
        Ok(())
    }

    async fn contains(&self, account: &str, service: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .await
            .contains_key(&(account.to_string(), service.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CustodyError;
    use crate::store::{PresenceOutcome, StaticPresence};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = MemorySecretStore::default();
        assert!(store.load("acct", "svc").await.unwrap().is_none());

        store.save("acct", "svc", b"secret", false).await.unwrap();
        assert!(store.contains("acct", "svc").await.unwrap());
        assert_eq!(
            store.load("acct", "svc").await.unwrap().unwrap().as_slice(),
            b"secret"
        );

        store.clear("acct", "svc").await.unwrap();
        assert!(!store.contains("acct", "svc").await.unwrap());
        store.clear("acct", "svc").await.unwrap();
    }

    #[tokio::test]
    async fn test_accounts_are_isolated() {
        let store = MemorySecretStore::default();
        store.save("a", "svc", b"one", false).await.unwrap();
        store.save("b", "svc", b"two", false).await.unwrap();
        assert_eq!(store.load("a", "svc").await.unwrap().unwrap().as_slice(), b"one");
        assert_eq!(store.load("b", "svc").await.unwrap().unwrap().as_slice(), b"two");
    }

    #[tokio::test]
    async fn test_protected_entry_needs_presence() {
        let gate = PresenceGate::new(
            Arc::new(StaticPresence(PresenceOutcome::Denied)),
            Duration::from_secs(1),
        );
        let store = MemorySecretStore::new(gate);
        store.save("acct", "open", b"public", false).await.unwrap();
        store.save("acct", "locked", b"secret", true).await.unwrap();

        assert!(store.load("acct", "open").await.unwrap().is_some());
        assert!(matches!(
            store.load("acct", "locked").await,
            Err(CustodyError::UserPresenceRequired)
        ));
        // contains never prompts
        assert!(store.contains("acct", "locked").await.unwrap());
    }
}
