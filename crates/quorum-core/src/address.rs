//! Address encoding for the supported chains
//!
//! - Ethereum: EIP-55 checksummed hex of the last 20 bytes of Keccak-256(x || y)
//! - Solana: base-58 of the Ed25519 public key
//! - Bitcoin: bech32 P2WPKH (native SegWit) or base58check P2PKH (legacy)

use serde::{Deserialize, Serialize};

use crate::crypto::{hash160, keccak256};
use crate::error::{Error, Result};

/// Bitcoin network for address encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    #[default]
    Mainnet,
    Testnet,
}

impl BitcoinNetwork {
    fn hrp(&self) -> bech32::Hrp {
        match self {
            BitcoinNetwork::Mainnet => bech32::hrp::BC,
            BitcoinNetwork::Testnet => bech32::hrp::TB,
        }
    }

    fn p2pkh_version(&self) -> u8 {
        match self {
            BitcoinNetwork::Mainnet => 0x00,
            BitcoinNetwork::Testnet => 0x6f,
        }
    }
}

/// Derive an EIP-55 Ethereum address from an uncompressed SEC1 point (65 bytes, 0x04 tag)
pub fn ethereum_address(uncompressed: &[u8; 65]) -> Result<String> {
    if uncompressed[0] != 0x04 {
        return Err(Error::InvalidAddress(
            "Expected uncompressed SEC1 point".to_string(),
        ));
    }
    let hash = keccak256(&uncompressed[1..]);
    Ok(to_eip55(&hash[12..]))
}

/// Render 20 address bytes with the EIP-55 mixed-case checksum
pub fn to_eip55(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        let byte = digest[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Solana addresses are the base-58 public key
pub fn solana_address(public_key: &[u8; 32]) -> String {
    bs58::encode(public_key).into_string()
}

/// Native SegWit (witness v0) P2WPKH address for a compressed public key
pub fn bitcoin_p2wpkh_address(compressed: &[u8; 33], network: BitcoinNetwork) -> Result<String> {
    let program = hash160(compressed);
    bech32::segwit::encode(network.hrp(), bech32::segwit::VERSION_0, &program)
        .map_err(|e| Error::InvalidAddress(format!("bech32 encoding failed: {}", e)))
}

/// Legacy P2PKH address for either public key encoding
pub fn bitcoin_p2pkh_address(public_key: &[u8], network: BitcoinNetwork) -> Result<String> {
    if public_key.len() != 33 && public_key.len() != 65 {
        return Err(Error::InvalidAddress(format!(
            "P2PKH needs a 33 or 65 byte public key, got {}",
            public_key.len()
        )));
    }
    let mut payload = Vec::with_capacity(21);
    payload.push(network.p2pkh_version());
    payload.extend_from_slice(&hash160(public_key));
    Ok(bs58::encode(payload).with_check().into_string())
}

/// P2WPKH script code used by BIP-143 sighashes
pub fn p2wpkh_script_code(compressed: &[u8; 33]) -> [u8; 26] {
    let mut script = [0u8; 26];
    // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG, length-prefixed
    script[..4].copy_from_slice(&[0x19, 0x76, 0xa9, 0x14]);
    script[4..24].copy_from_slice(&hash160(compressed));
    script[24..].copy_from_slice(&[0x88, 0xac]);
    script
}
