//! Device identity
//!
//! Each physical device holds one Ed25519 keypair, generated at enrollment. The
//! private half lives only in the secret store (biometry-protected); callers get
//! a signing capability, never the key.

use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use quorum_core::{DevicePublicKey, DeviceSignature};

use crate::config::SignerConfig;
use crate::error::{CustodyError, Result};
use crate::store::{namespace, SecretStore};

/// Signing capability over a device key
#[async_trait]
pub trait DeviceSigner: Send + Sync {
    fn public_key(&self) -> DevicePublicKey;

    /// Sign `data`; may suspend on a presence prompt
    async fn sign(&self, data: &[u8]) -> Result<DeviceSignature>;
}

/// Store-backed device identity for one account
pub struct DeviceIdentity {
    store: Arc<dyn SecretStore>,
    config: Arc<SignerConfig>,
    account: String,
    public_key: DevicePublicKey,
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("account", &self.account)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl DeviceIdentity {
    /// Enroll this device: create and persist a fresh keypair
    #[instrument(skip(store, config))]
    pub async fn generate(
        store: Arc<dyn SecretStore>,
        config: Arc<SignerConfig>,
        account: &str,
    ) -> Result<Self> {
        let key_service = config.service(namespace::DEVICE_KEY);
        if store.contains(account, &key_service).await? {
            return Err(CustodyError::DeviceAlreadyEnrolled);
        }

        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let secret = Zeroizing::new(signing_key.to_bytes());
        let public_key = DevicePublicKey::new(signing_key.verifying_key().to_bytes());

        store.save(account, &key_service, secret.as_slice(), true).await?;
        store
            .save(
                account,
                &config.service(namespace::DEVICE_PUBLIC_KEY),
                public_key.as_bytes(),
                false,
            )
            .await?;

        info!(device = %public_key, "Enrolled device key");
        Ok(Self {
            store,
            config,
            account: account.to_string(),
            public_key,
        })
    }

    /// Open an existing enrollment from the public key cache
    ///
    /// Falls back to the private key (one presence prompt) when the cache is
    /// missing, and repopulates it.
    #[instrument(skip(store, config))]
    pub async fn open(
        store: Arc<dyn SecretStore>,
        config: Arc<SignerConfig>,
        account: &str,
    ) -> Result<Self> {
        let cache_service = config.service(namespace::DEVICE_PUBLIC_KEY);
        let public_key = match store.load(account, &cache_service).await? {
            Some(bytes) => {
                let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    CustodyError::Store(format!(
                        "Device public key cache has {} bytes",
                        bytes.len()
                    ))
                })?;
                DevicePublicKey::new(bytes)
            }
            None => {
                warn!("Device public key cache missing, recomputing");
                let signing_key =
                    load_signing_key(store.as_ref(), &config, account).await?;
                let public_key = DevicePublicKey::new(signing_key.verifying_key().to_bytes());
                store
                    .save(account, &cache_service, public_key.as_bytes(), false)
                    .await?;
                public_key
            }
        };

        Ok(Self {
            store,
            config,
            account: account.to_string(),
            public_key,
        })
    }

    /// Canonical base-58 token used in sharding policies
    pub fn public_external_representation(&self) -> String {
        self.public_key.to_base58()
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Remove the device key and its cache
    #[instrument(skip(self), fields(device = %self.public_key))]
    pub async fn unenroll(self) -> Result<()> {
        self.store
            .clear(&self.account, &self.config.service(namespace::DEVICE_KEY))
            .await?;
        self.store
            .clear(&self.account, &self.config.service(namespace::DEVICE_PUBLIC_KEY))
            .await?;
        info!("Device unenrolled");
        Ok(())
    }
}

#[async_trait]
impl DeviceSigner for DeviceIdentity {
    fn public_key(&self) -> DevicePublicKey {
        self.public_key
    }

    #[instrument(skip(self, data), fields(device = %self.public_key, len = data.len()))]
    async fn sign(&self, data: &[u8]) -> Result<DeviceSignature> {
        let signing_key = load_signing_key(self.store.as_ref(), &self.config, &self.account).await?;
        if signing_key.verifying_key().to_bytes() != *self.public_key.as_bytes() {
            return Err(CustodyError::Store(
                "Stored device key does not match the enrolled public key".to_string(),
            ));
        }
        Ok(DeviceSignature::new(signing_key.sign(data).to_bytes()))
    }
}

async fn load_signing_key(
    store: &dyn SecretStore,
    config: &SignerConfig,
    account: &str,
) -> Result<SigningKey> {
    let bytes = store
        .load(account, &config.service(namespace::DEVICE_KEY))
        .await?
        .ok_or(CustodyError::DeviceNotEnrolled)?;
    let secret: Zeroizing<[u8; 32]> = Zeroizing::new(bytes.as_slice().try_into().map_err(|_| {
        CustodyError::Store(format!("Device key has {} bytes", bytes.len()))
    })?);
    Ok(SigningKey::from_bytes(&secret))
}
