//! Root secret vault
//!
//! Owns the root secret namespace of one account: storing, loading, legacy
//! migration, and the derived public key cache. Mutations are serialized so a
//! migration can never interleave with a store or clear.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use quorum_core::{Chain, ChainPublicKey, RootSecret};

use crate::config::SignerConfig;
use crate::error::{CustodyError, Result};
use crate::store::{namespace, SecretStore};

/// Result of [`KeyVault::migrate_legacy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// A legacy secret was copied into the current namespace and every legacy
    /// entry removed
    Migrated { from: String, purged: Vec<String> },
    /// The current namespace already held a secret; stale legacy entries removed
    PurgedLegacy { removed: Vec<String> },
    /// No legacy entries exist
    NothingToMigrate,
}

/// Root secret access for one account
pub struct KeyVault {
    store: Arc<dyn SecretStore>,
    config: Arc<SignerConfig>,
    account: String,
    mutation: Mutex<()>,
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl KeyVault {
    pub fn new(store: Arc<dyn SecretStore>, config: Arc<SignerConfig>, account: &str) -> Self {
        Self {
            store,
            config,
            account: account.to_string(),
            mutation: Mutex::new(()),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    fn root_service(&self) -> String {
        self.config.service(namespace::ROOT_SECRET)
    }

    fn cache_service(&self) -> String {
        self.config.service(namespace::DERIVED_PUBLIC_KEYS)
    }

    /// Whether a root secret is stored; never prompts
    pub async fn has_root_secret(&self) -> Result<bool> {
        self.store.contains(&self.account, &self.root_service()).await
    }

    /// Store (or replace) the root secret, invalidating derived caches
    #[instrument(skip(self, secret), fields(account = %self.account))]
    pub async fn store_root_secret(&self, secret: &RootSecret) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.store
            .save(&self.account, &self.root_service(), secret.as_bytes(), true)
            .await?;
        self.store.clear(&self.account, &self.cache_service()).await?;
        info!(fingerprint = %hex::encode(secret.fingerprint()), "Stored root secret");
        Ok(())
    }

    /// Generate and store a fresh root secret, returning its fingerprint
    pub async fn generate_root_secret(&self) -> Result<[u8; 8]> {
        let secret = RootSecret::generate();
        self.store_root_secret(&secret).await?;
        Ok(secret.fingerprint())
    }

    /// Load the root secret; prompts for user presence
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn load_root_secret(&self) -> Result<RootSecret> {
        let bytes = self
            .store
            .load(&self.account, &self.root_service())
            .await?
            .ok_or(CustodyError::RootSecretMissing)?;
        Ok(RootSecret::from_bytes(&bytes)?)
    }

    /// Remove the root secret and the derived caches
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn clear_root_secret(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.store.clear(&self.account, &self.root_service()).await?;
        self.store.clear(&self.account, &self.cache_service()).await?;
        info!("Cleared root secret");
        Ok(())
    }

    /// Move a root secret out of legacy namespaces
    ///
    /// Copies the first valid legacy secret into the current namespace when it
    /// is empty, then purges every legacy entry. The copy is written before any
    /// legacy entry is removed. Running it again is a no-op.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn migrate_legacy(&self) -> Result<MigrationOutcome> {
        let _guard = self.mutation.lock().await;

        let mut present = Vec::new();
        for service in &self.config.legacy_services {
            if self.store.contains(&self.account, service).await? {
                present.push(service.clone());
            }
        }
        if present.is_empty() {
            debug!("No legacy root secret entries");
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let current = self.root_service();
        let mut migrated_from = None;
        if !self.store.contains(&self.account, &current).await? {
            for service in &present {
                let Some(bytes) = self.store.load(&self.account, service).await? else {
                    continue;
                };
                match RootSecret::from_bytes(&bytes) {
                    Ok(secret) => {
                        self.store
                            .save(&self.account, &current, secret.as_bytes(), true)
                            .await?;
                        self.store.clear(&self.account, &self.cache_service()).await?;
                        migrated_from = Some(service.clone());
                        break;
                    }
                    Err(e) => warn!(service = %service, error = %e, "Skipping invalid legacy entry"),
                }
            }
            if migrated_from.is_none() {
                // Nothing valid to carry over; keep the legacy data for inspection
                return Err(CustodyError::Store(
                    "Legacy root secret entries are all invalid".to_string(),
                ));
            }
        }

        for service in &present {
            self.store.clear(&self.account, service).await?;
        }

        Ok(match migrated_from {
            Some(from) => {
                info!(from = %from, purged = present.len(), "Migrated legacy root secret");
                MigrationOutcome::Migrated {
                    from,
                    purged: present,
                }
            }
            None => {
                info!(removed = present.len(), "Purged stale legacy root secret entries");
                MigrationOutcome::PurgedLegacy { removed: present }
            }
        })
    }

    /// Public keys for every chain at the configured index
    ///
    /// Served from an unprotected cache when possible; a miss loads the root
    /// secret once and repopulates it. The miss path holds the mutation lock so
    /// a concurrent rotation cannot be overwritten with the old secret's keys.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn chain_public_keys(&self) -> Result<Vec<ChainPublicKey>> {
        let index = self.config.default_derivation_index;
        if let Some(bytes) = self.store.load(&self.account, &self.cache_service()).await? {
            match bitcode::decode::<Vec<ChainPublicKey>>(&bytes) {
                Ok(keys)
                    if keys.iter().map(|k| k.chain).eq(Chain::ALL)
                        && keys.iter().all(|k| k.derivation_index == index) =>
                {
                    return Ok(keys);
                }
                Ok(_) => debug!("Derived key cache is stale"),
                Err(e) => warn!(error = %e, "Derived key cache is corrupt, re-deriving"),
            }
        }

        let _guard = self.mutation.lock().await;
        let root = self
            .load_root_secret()
            .await
            .map_err(|e| CustodyError::DerivationFailure(Box::new(e)))?;
        let keys = Chain::ALL
            .iter()
            .map(|&chain| root.derive(chain, index).map(|pair| pair.public().clone()))
            .collect::<quorum_core::Result<Vec<_>>>()
            .map_err(|e| CustodyError::DerivationFailure(Box::new(e.into())))?;

        self.store
            .save(&self.account, &self.cache_service(), &bitcode::encode(&keys), false)
            .await?;
        Ok(keys)
    }

    /// Cached public key for one chain
    pub async fn public_key(&self, chain: Chain) -> Result<ChainPublicKey> {
        self.chain_public_keys()
            .await?
            .into_iter()
            .find(|k| k.chain == chain)
            .ok_or_else(|| CustodyError::Store(format!("No cached {} key", chain)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySecretStore;
    use quorum_core::ROOT_SECRET_LEN;

    fn vault() -> (Arc<MemorySecretStore>, KeyVault) {
        let store = Arc::new(MemorySecretStore::default());
        let vault = KeyVault::new(store.clone(), Arc::new(SignerConfig::default()), "acct");
        (store, vault)
    }

    #[tokio::test]
    async fn test_store_and_load_root_secret() {
        let (_, vault) = vault();
        assert!(!vault.has_root_secret().await.unwrap());
        assert!(matches!(
            vault.load_root_secret().await,
            Err(CustodyError::RootSecretMissing)
        ));

        let fingerprint = vault.generate_root_secret().await.unwrap();
        assert!(vault.has_root_secret().await.unwrap());
        assert_eq!(vault.load_root_secret().await.unwrap().fingerprint(), fingerprint);

        vault.clear_root_secret().await.unwrap();
        assert!(!vault.has_root_secret().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_root_secret_is_a_length_error() {
        let (store, vault) = vault();
        store
            .save("acct", &vault.root_service(), &[1u8; 16], true)
            .await
            .unwrap();
        assert!(matches!(
            vault.load_root_secret().await,
            Err(CustodyError::InvalidSeedLength {
                expected: ROOT_SECRET_LEN,
                actual: 16
            })
        ));
    }

    #[tokio::test]
    async fn test_migrates_legacy_secret() {
        let (store, vault) = vault();
        let legacy = vault.config().legacy_services[0].clone();
        store
            .save("acct", &legacy, &[7u8; ROOT_SECRET_LEN], false)
            .await
            .unwrap();

        let outcome = vault.migrate_legacy().await.unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                from: legacy.clone(),
                purged: vec![legacy.clone()]
            }
        );
        assert!(!store.contains("acct", &legacy).await.unwrap());
        assert_eq!(
            vault.load_root_secret().await.unwrap().as_bytes(),
            &[7u8; ROOT_SECRET_LEN]
        );

        assert_eq!(
            vault.migrate_legacy().await.unwrap(),
            MigrationOutcome::NothingToMigrate
        );
    }

    #[tokio::test]
    async fn test_migration_keeps_current_secret() {
        let (store, vault) = vault();
        vault
            .store_root_secret(&RootSecret::from_bytes(&[1u8; ROOT_SECRET_LEN]).unwrap())
            .await
            .unwrap();
        for service in vault.config().legacy_services.clone() {
            store
                .save("acct", &service, &[2u8; ROOT_SECRET_LEN], true)
                .await
                .unwrap();
        }

        let outcome = vault.migrate_legacy().await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::PurgedLegacy { ref removed } if removed.len() == 2));
        assert_eq!(
            vault.load_root_secret().await.unwrap().as_bytes(),
            &[1u8; ROOT_SECRET_LEN]
        );
    }

    #[tokio::test]
    async fn test_migration_skips_invalid_legacy_entry() {
        let (store, vault) = vault();
        let services = vault.config().legacy_services.clone();
        store.save("acct", &services[0], &[9u8; 12], false).await.unwrap();
        store
            .save("acct", &services[1], &[3u8; ROOT_SECRET_LEN], false)
            .await
            .unwrap();

        let outcome = vault.migrate_legacy().await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::Migrated { ref from, .. } if *from == services[1]));
        for service in &services {
            assert!(!store.contains("acct", service).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_migration_with_only_invalid_entries_keeps_them() {
        let (store, vault) = vault();
        let legacy = vault.config().legacy_services[0].clone();
        store.save("acct", &legacy, &[9u8; 12], false).await.unwrap();

        assert!(matches!(
            vault.migrate_legacy().await,
            Err(CustodyError::Store(_))
        ));
        assert!(store.contains("acct", &legacy).await.unwrap());
        assert!(!vault.has_root_secret().await.unwrap());
    }

    #[tokio::test]
    async fn test_public_key_cache_follows_root_secret() {
        let (store, vault) = vault();
        vault
            .store_root_secret(&RootSecret::from_bytes(&[1u8; ROOT_SECRET_LEN]).unwrap())
            .await
            .unwrap();
        let first = vault.chain_public_keys().await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(store.contains("acct", &vault.cache_service()).await.unwrap());

        vault
            .store_root_secret(&RootSecret::from_bytes(&[2u8; ROOT_SECRET_LEN]).unwrap())
            .await
            .unwrap();
        assert!(!store.contains("acct", &vault.cache_service()).await.unwrap());

        let second = vault.public_key(Chain::Ethereum).await.unwrap();
        assert_ne!(second, first[0]);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_rederived() {
        let (store, vault) = vault();
        vault
            .store_root_secret(&RootSecret::from_bytes(&[1u8; ROOT_SECRET_LEN]).unwrap())
            .await
            .unwrap();
        let expected = vault.chain_public_keys().await.unwrap();

        store
            .save("acct", &vault.cache_service(), b"garbage", false)
            .await
            .unwrap();
        assert_eq!(vault.chain_public_keys().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_cache_with_wrong_chains_is_rederived() {
        let (store, vault) = vault();
        let root = RootSecret::from_bytes(&[1u8; ROOT_SECRET_LEN]).unwrap();
        vault.store_root_secret(&root).await.unwrap();
        let expected = vault.chain_public_keys().await.unwrap();

        let eth = root.derive(Chain::Ethereum, 0).unwrap().public().clone();
        let duplicated = vec![eth.clone(), eth.clone(), eth];
        store
            .save("acct", &vault.cache_service(), &bitcode::encode(&duplicated), false)
            .await
            .unwrap();

        assert_eq!(vault.chain_public_keys().await.unwrap(), expected);
        assert_eq!(vault.public_key(Chain::Bitcoin).await.unwrap(), expected[2]);
    }

    #[tokio::test]
    async fn test_public_keys_without_root_secret() {
        let (_, vault) = vault();
        let err = vault.chain_public_keys().await.unwrap_err();
        assert!(matches!(err, CustodyError::DerivationFailure(ref cause)
            if matches!(**cause, CustodyError::RootSecretMissing)));
    }
}
