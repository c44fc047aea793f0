//! Solana legacy message wire format

use serde::{Deserialize, Serialize};

use crate::chain::ChainPublicKey;
use crate::error::{Error, Result};

/// Message header: signer and read-only account counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// Instruction with accounts referenced by index into the message keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    #[serde(with = "crate::types::hex_vec")]
    pub data: Vec<u8>,
}

/// Unsigned legacy Solana message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaMessage {
    #[serde(default)]
    pub derivation_index: u32,
    pub header: MessageHeader,
    #[serde(with = "crate::types::base58_keys")]
    pub account_keys: Vec<[u8; 32]>,
    #[serde(with = "crate::types::base58_array")]
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl SolanaMessage {
    /// Validate against the signing key and encode to wire bytes
    pub fn serialize_for(&self, key: &ChainPublicKey) -> Result<Vec<u8>> {
        self.validate()?;

        let required = self.header.num_required_signatures as usize;
        let signer = key.public_key.as_slice();
        if !self.account_keys[..required]
            .iter()
            .any(|k| k.as_slice() == signer)
        {
            return Err(Error::Serialization(
                "derived key is not a required signer of the message".to_string(),
            ));
        }

        Ok(self.to_bytes())
    }

    /// Structural checks on header counts and instruction indices
    pub fn validate(&self) -> Result<()> {
        let keys = self.account_keys.len();
        let required = self.header.num_required_signatures as usize;

        if keys > u8::MAX as usize + 1 {
            return Err(Error::Serialization(format!("too many account keys: {}", keys)));
        }
        if required == 0 || required > keys {
            return Err(Error::Serialization(format!(
                "invalid required signature count {} for {} keys",
                required, keys
            )));
        }
        // The fee payer must stay writable
        if self.header.num_readonly_signed_accounts as usize >= required {
            return Err(Error::Serialization(
                "all signers are read-only".to_string(),
            ));
        }
        if self.header.num_readonly_unsigned_accounts as usize > keys - required {
            return Err(Error::Serialization(
                "read-only unsigned count exceeds unsigned accounts".to_string(),
            ));
        }

        for (i, ix) in self.instructions.iter().enumerate() {
            if ix.program_id_index as usize >= keys {
                return Err(Error::Serialization(format!(
                    "instruction {} program index {} out of range",
                    i, ix.program_id_index
                )));
            }
            if let Some(bad) = ix.accounts.iter().find(|&&a| a as usize >= keys) {
                return Err(Error::Serialization(format!(
                    "instruction {} account index {} out of range",
                    i, bad
                )));
            }
        }
        Ok(())
    }

    /// Wire encoding: header, keys, blockhash, instructions (short-vec lengths)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);

        encode_short_vec_len(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key);
        }
        out.extend_from_slice(&self.recent_blockhash);

        encode_short_vec_len(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_short_vec_len(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            encode_short_vec_len(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }
}

/// Compact-u16 length: 7 bits per byte, high bit continues
fn encode_short_vec_len(out: &mut Vec<u8>, len: usize) {
    let mut rem = len;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;

    fn signer_key() -> ChainPublicKey {
        ChainPublicKey {
            chain: Chain::Solana,
            derivation_index: 0,
            public_key: vec![0xaa; 32],
        }
    }

    fn transfer() -> SolanaMessage {
        SolanaMessage {
            derivation_index: 0,
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys: vec![[0xaa; 32], [0xbb; 32], [0x00; 32]],
            recent_blockhash: [0xcc; 32],
            instructions: vec![CompiledInstruction {
                program_id_index: 2,
                accounts: vec![0, 1],
                data: vec![2, 0, 0, 0, 0x40, 0x42, 0x0f, 0, 0, 0, 0, 0],
            }],
        }
    }

    #[test]
    fn test_short_vec_encoding() {
        let cases: [(usize, &[u8]); 5] = [
            (0, &[0x00]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (255, &[0xff, 0x01]),
            (16384, &[0x80, 0x80, 0x01]),
        ];
        for (len, expected) in cases {
            let mut out = Vec::new();
            encode_short_vec_len(&mut out, len);
            assert_eq!(out, expected, "len {}", len);
        }
    }

    #[test]
    fn test_wire_layout() {
        let bytes = transfer().serialize_for(&signer_key()).unwrap();
        assert_eq!(&bytes[..3], &[1, 0, 1]);
        assert_eq!(bytes[3], 3);
        // header + len + 3 keys + blockhash + ix count + ix(1 + 1 + 2 + 1 + 12)
        assert_eq!(bytes.len(), 3 + 1 + 96 + 32 + 1 + 17);
        assert_eq!(&bytes[100..132], &[0xcc; 32]);
    }

    #[test]
    fn test_rejects_foreign_signer() {
        let mut msg = transfer();
        msg.account_keys.swap(0, 1);
        assert!(msg.serialize_for(&signer_key()).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_indices() {
        let mut msg = transfer();
        msg.instructions[0].accounts.push(9);
        assert!(msg.validate().is_err());

        let mut msg = transfer();
        msg.instructions[0].program_id_index = 3;
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut msg = transfer();
        msg.header.num_required_signatures = 0;
        assert!(msg.validate().is_err());

        let mut msg = transfer();
        msg.header.num_readonly_signed_accounts = 1;
        assert!(msg.validate().is_err());

        let mut msg = transfer();
        msg.header.num_readonly_unsigned_accounts = 3;
        assert!(msg.validate().is_err());
    }
}
