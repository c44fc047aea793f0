//! BIP-143 sighash preimages for P2WPKH spends

use serde::{Deserialize, Serialize};

use crate::address::p2wpkh_script_code;
use crate::chain::ChainPublicKey;
use crate::crypto::double_sha256;
use crate::error::{Error, Result};

pub const SIGHASH_ALL: u32 = 0x01;

/// Outpoint being spent from the derived key's P2WPKH address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    /// Previous transaction id in internal (little-endian) byte order
    #[serde(with = "crate::types::hex_array")]
    pub prev_txid: [u8; 32],
    pub prev_vout: u32,
    /// Value of the spent output in satoshis
    pub amount: u64,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
}

fn default_sequence() -> u32 {
    0xffff_fffd
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub value: u64,
    #[serde(with = "crate::types::hex_vec")]
    pub script_pubkey: Vec<u8>,
}

/// Unsigned SegWit v0 transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitcoinTransaction {
    #[serde(default)]
    pub derivation_index: u32,
    #[serde(default = "default_version")]
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub lock_time: u32,
}

fn default_version() -> u32 {
    2
}

impl BitcoinTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(Error::Serialization("transaction has no inputs".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(Error::Serialization("transaction has no outputs".to_string()));
        }

        let total_in = self
            .inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.amount))
            .ok_or_else(|| Error::Serialization("input amounts overflow".to_string()))?;
        let total_out = self
            .outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
            .ok_or_else(|| Error::Serialization("output values overflow".to_string()))?;
        if total_out > total_in {
            return Err(Error::Serialization(format!(
                "outputs ({} sat) exceed inputs ({} sat)",
                total_out, total_in
            )));
        }
        Ok(())
    }

    /// One BIP-143 preimage per input, all spending from `key`'s P2WPKH output
    pub fn sighash_preimages(&self, key: &ChainPublicKey) -> Result<Vec<Vec<u8>>> {
        self.validate()?;
        let script_code = p2wpkh_script_code(&key.compressed()?);

        let hash_prevouts = {
            let mut buf = Vec::with_capacity(36 * self.inputs.len());
            for input in &self.inputs {
                buf.extend_from_slice(&input.prev_txid);
                buf.extend_from_slice(&input.prev_vout.to_le_bytes());
            }
            double_sha256(&buf)
        };
        let hash_sequence = {
            let mut buf = Vec::with_capacity(4 * self.inputs.len());
            for input in &self.inputs {
                buf.extend_from_slice(&input.sequence.to_le_bytes());
            }
            double_sha256(&buf)
        };
        let hash_outputs = {
            let mut buf = Vec::new();
            for output in &self.outputs {
                buf.extend_from_slice(&output.value.to_le_bytes());
                write_compact_size(&mut buf, output.script_pubkey.len() as u64);
                buf.extend_from_slice(&output.script_pubkey);
            }
            double_sha256(&buf)
        };

        Ok(self
            .inputs
            .iter()
            .map(|input| {
                let mut preimage = Vec::with_capacity(182);
                preimage.extend_from_slice(&self.version.to_le_bytes());
                preimage.extend_from_slice(&hash_prevouts);
                preimage.extend_from_slice(&hash_sequence);
                preimage.extend_from_slice(&input.prev_txid);
                preimage.extend_from_slice(&input.prev_vout.to_le_bytes());
                preimage.extend_from_slice(&script_code);
                preimage.extend_from_slice(&input.amount.to_le_bytes());
                preimage.extend_from_slice(&input.sequence.to_le_bytes());
                preimage.extend_from_slice(&hash_outputs);
                preimage.extend_from_slice(&self.lock_time.to_le_bytes());
                preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
                preimage
            })
            .collect())
    }
}

fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}
