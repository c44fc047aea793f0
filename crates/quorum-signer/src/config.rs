//! Signer configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use quorum_core::BitcoinNetwork;

use crate::error::{CustodyError, Result};

/// Signer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Prefix for every secret store service namespace
    pub service_prefix: String,

    /// Full service names that may still hold a root secret from older releases
    pub legacy_services: Vec<String>,

    /// How long a user presence prompt may stay open (seconds)
    pub presence_timeout_secs: u64,

    /// Network used when rendering Bitcoin addresses
    pub bitcoin_network: BitcoinNetwork,

    /// Account index used for cached chain public keys
    pub default_derivation_index: u32,

    /// Directory of the encrypted file store
    pub store_path: PathBuf,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            service_prefix: "io.quorum.custody".to_string(),
            legacy_services: vec![
                "io.quorum.wallet.seed".to_string(),
                "io.quorum.wallet.seed.biometric".to_string(),
            ],
            presence_timeout_secs: 60,
            bitcoin_network: BitcoinNetwork::Mainnet,
            default_derivation_index: 0,
            store_path: Self::default_store_path(),
        }
    }
}

impl SignerConfig {
    fn default_store_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("quorum")
            .join("secrets")
    }

    /// Platform config file location
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("quorum")
            .join("signer.json")
    }

    /// Fully qualified service name for a store namespace
    pub fn service(&self, namespace: &str) -> String {
        format!("{}.{}", self.service_prefix, namespace)
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_prefix.is_empty() {
            return Err(CustodyError::Config("service_prefix is empty".to_string()));
        }
        if self.presence_timeout_secs == 0 {
            return Err(CustodyError::Config(
                "presence_timeout_secs must be positive".to_string(),
            ));
        }
        let current = self.service(crate::store::namespace::ROOT_SECRET);
        if self.legacy_services.iter().any(|s| *s == current) {
            return Err(CustodyError::Config(format!(
                "legacy service {} collides with the current root secret namespace",
                current
            )));
        }
        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}
