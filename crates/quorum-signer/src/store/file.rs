//! Encrypted-at-rest file store
//!
//! Each (account, service) entry is its own file, named by a hash of the pair
//! so neither identifier appears on disk. Entries are sealed with:
//!
//! - **Argon2id** to derive the store key from a passphrase and a per-store salt
//! - **ChaCha20-Poly1305** with the account, service and protection flag as
//!   associated data, so entries cannot be swapped or relabelled

use std::path::{Path, PathBuf};

use argon2::Argon2;
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use super::{PresenceGate, SecretStore};
use crate::error::{CustodyError, Result};

const ENTRY_VERSION: u8 = 1;
const ENTRY_EXTENSION: &str = "entry";
const SALT_FILE: &str = "store.salt";
const SALT_LEN: usize = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

#[derive(bitcode::Encode, bitcode::Decode)]
struct StoredEntry {
    version: u8,
    biometry_protected: bool,
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
}

/// Secret store backed by one encrypted file per entry
pub struct FileSecretStore {
    dir: PathBuf,
    key: Zeroizing<[u8; 32]>,
    gate: PresenceGate,
}

impl std::fmt::Debug for FileSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSecretStore")
            .field("dir", &self.dir)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl FileSecretStore {
    /// Open (or create) a store with the default Argon2id cost
    pub async fn open(dir: impl AsRef<Path>, passphrase: &str, gate: PresenceGate) -> Result<Self> {
        Self::open_with_params(dir, passphrase, KdfParams::default(), gate).await
    }

    #[instrument(skip(dir, passphrase, gate), fields(path = %dir.as_ref().display()))]
    pub async fn open_with_params(
        dir: impl AsRef<Path>,
        passphrase: &str,
        params: KdfParams,
        gate: PresenceGate,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        set_owner_only(&dir, 0o700).await?;

        let salt = load_or_create_salt(&dir).await?;
        let key = derive_key(passphrase, &salt, params)?;

        info!("Opened encrypted secret store");
        Ok(Self { dir, key, gate })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, account: &str, service: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update((account.len() as u32).to_be_bytes());
        hasher.update(account.as_bytes());
        hasher.update(service.as_bytes());
        let name = hex::encode(hasher.finalize());
        self.dir.join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(self.key.as_slice())
            .map_err(|e| CustodyError::Store(format!("Failed to create cipher: {}", e)))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    #[instrument(skip(self, data))]
    async fn save(
        &self,
        account: &str,
        service: &str,
        data: &[u8],
        biometry_protected: bool,
    ) -> Result<()> {
        let mut nonce = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let aad = associated_data(account, service, biometry_protected);
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: data, aad: &aad })
            .map_err(|e| CustodyError::Store(format!("Encryption failed: {}", e)))?;

        let encoded = bitcode::encode(&StoredEntry {
            version: ENTRY_VERSION,
            biometry_protected,
            nonce,
            ciphertext,
        });

        let path = self.entry_path(account, service);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &encoded).await?;
        set_owner_only(&temp_path, 0o600).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!(bytes = data.len(), "Saved entry");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, account: &str, service: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let path = self.entry_path(account, service);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: StoredEntry = bitcode::decode(&raw)
            .map_err(|e| CustodyError::Store(format!("Corrupt entry: {}", e)))?;
        if entry.version != ENTRY_VERSION {
            return Err(CustodyError::Store(format!(
                "Unsupported entry version {}",
                entry.version
            )));
        }

        if entry.biometry_protected {
            self.gate.require(service).await?;
        }

        let aad = associated_data(account, service, entry.biometry_protected);
        let plaintext = self
            .cipher()?
            .decrypt(
                Nonce::from_slice(&entry.nonce),
                Payload {
                    msg: &entry.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                CustodyError::Store("Decryption failed - wrong passphrase or tampered entry".to_string())
            })?;

        Ok(Some(Zeroizing::new(plaintext)))
    }

    #[instrument(skip(self))]
    async fn clear(&self, account: &str, service: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(account, service)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, account: &str, service: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.entry_path(account, service)).await?)
    }
}

fn associated_data(account: &str, service: &str, biometry_protected: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(9 + account.len() + service.len());
    aad.extend_from_slice(&(account.len() as u32).to_be_bytes());
    aad.extend_from_slice(account.as_bytes());
    aad.extend_from_slice(&(service.len() as u32).to_be_bytes());
    aad.extend_from_slice(service.as_bytes());
    aad.push(biometry_protected as u8);
    aad
}

async fn load_or_create_salt(dir: &Path) -> Result<[u8; SALT_LEN]> {
    let path = dir.join(SALT_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => bytes.as_slice().try_into().map_err(|_| {
            CustodyError::Store(format!("Salt file has {} bytes, expected {}", bytes.len(), SALT_LEN))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut salt = [0u8; SALT_LEN];
            rand::rngs::OsRng.fill_bytes(&mut salt);
            tokio::fs::write(&path, salt).await?;
            set_owner_only(&path, 0o600).await?;
            Ok(salt)
        }
        Err(e) => Err(e.into()),
    }
}

/// Derive the store key from the passphrase using Argon2id
fn derive_key(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    let params = argon2::Params::new(params.memory_kib, params.iterations, params.parallelism, Some(32))
        .map_err(|e| CustodyError::Config(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| CustodyError::Store(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

#[cfg(unix)]
async fn set_owner_only(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
