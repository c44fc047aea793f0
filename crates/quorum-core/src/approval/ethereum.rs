//! EIP-712 encoding of Safe multisig transactions

use serde::{Deserialize, Serialize};

use crate::crypto::keccak256;
use crate::error::{Error, Result};

const DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";
const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,\
uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,\
uint256 nonce)";

/// Safe call type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SafeOperation {
    #[default]
    Call,
    DelegateCall,
}

impl SafeOperation {
    fn as_u8(&self) -> u8 {
        match self {
            SafeOperation::Call => 0,
            SafeOperation::DelegateCall => 1,
        }
    }
}

/// A Safe transaction awaiting owner signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmSafeTransaction {
    #[serde(default)]
    pub derivation_index: u32,
    pub chain_id: u64,
    #[serde(with = "crate::types::hex_array")]
    pub safe_address: [u8; 20],
    #[serde(with = "crate::types::hex_array")]
    pub to: [u8; 20],
    /// Wei, as a decimal string on the wire
    #[serde(with = "decimal_u128")]
    pub value: u128,
    #[serde(with = "crate::types::hex_vec", default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub operation: SafeOperation,
    #[serde(default)]
    pub safe_tx_gas: u64,
    #[serde(default)]
    pub base_gas: u64,
    #[serde(default)]
    pub gas_price: u64,
    #[serde(with = "crate::types::hex_array", default)]
    pub gas_token: [u8; 20],
    #[serde(with = "crate::types::hex_array", default)]
    pub refund_receiver: [u8; 20],
    pub nonce: u64,
}

impl EvmSafeTransaction {
    /// keccak256(EIP712Domain(uint256 chainId,address verifyingContract))
    pub fn domain_typehash() -> [u8; 32] {
        keccak256(DOMAIN_TYPE.as_bytes())
    }

    /// keccak256 of the SafeTx type string
    pub fn safe_tx_typehash() -> [u8; 32] {
        keccak256(SAFE_TX_TYPE.as_bytes())
    }

    pub fn domain_separator(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&Self::domain_typehash());
        buf.extend_from_slice(&word_u64(self.chain_id));
        buf.extend_from_slice(&word_address(&self.safe_address));
        keccak256(&buf)
    }

    pub fn struct_hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(32 * 11);
        buf.extend_from_slice(&Self::safe_tx_typehash());
        buf.extend_from_slice(&word_address(&self.to));
        buf.extend_from_slice(&word_u128(self.value));
        buf.extend_from_slice(&keccak256(&self.data));
        buf.extend_from_slice(&word_u64(self.operation.as_u8() as u64));
        buf.extend_from_slice(&word_u64(self.safe_tx_gas));
        buf.extend_from_slice(&word_u64(self.base_gas));
        buf.extend_from_slice(&word_u64(self.gas_price));
        buf.extend_from_slice(&word_address(&self.gas_token));
        buf.extend_from_slice(&word_address(&self.refund_receiver));
        buf.extend_from_slice(&word_u64(self.nonce));
        keccak256(&buf)
    }

    /// 0x19 || 0x01 || domainSeparator || structHash
    pub fn encode_eip712(&self) -> Result<[u8; 66]> {
        if self.chain_id == 0 {
            return Err(Error::Serialization("chain id must be non-zero".to_string()));
        }
        if self.safe_address == [0u8; 20] {
            return Err(Error::Serialization("safe address is zero".to_string()));
        }

        let mut out = [0u8; 66];
        out[0] = 0x19;
        out[1] = 0x01;
        out[2..34].copy_from_slice(&self.domain_separator());
        out[34..].copy_from_slice(&self.struct_hash());
        Ok(out)
    }

    /// The Safe transaction hash an owner signs
    pub fn safe_tx_hash(&self) -> Result<[u8; 32]> {
        Ok(keccak256(&self.encode_eip712()?))
    }
}

fn word_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_u128(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_address(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

mod decimal_u128 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EvmSafeTransaction {
        EvmSafeTransaction {
            derivation_index: 0,
            chain_id: 1,
            safe_address: [0x11; 20],
            to: [0x22; 20],
            value: 1_000_000_000_000_000_000,
            data: vec![],
            operation: SafeOperation::Call,
            safe_tx_gas: 0,
            base_gas: 0,
            gas_price: 0,
            gas_token: [0; 20],
            refund_receiver: [0; 20],
            nonce: 7,
        }
    }

    #[test]
    fn test_typehashes_match_safe_contracts() {
        assert_eq!(
            hex::encode(EvmSafeTransaction::domain_typehash()),
            "47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218"
        );
        assert_eq!(
            hex::encode(EvmSafeTransaction::safe_tx_typehash()),
            "bb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8"
        );
    }

    #[test]
    fn test_encoding_layout() {
        let tx = sample();
        let encoded = tx.encode_eip712().unwrap();
        assert_eq!(&encoded[..2], &[0x19, 0x01]);
        assert_eq!(&encoded[2..34], &tx.domain_separator());
        assert_eq!(&encoded[34..], &tx.struct_hash());
    }

    #[test]
    fn test_every_field_is_bound() {
        let base = sample().safe_tx_hash().unwrap();

        let mut tx = sample();
        tx.nonce += 1;
        assert_ne!(tx.safe_tx_hash().unwrap(), base);

        let mut tx = sample();
        tx.chain_id = 5;
        assert_ne!(tx.safe_tx_hash().unwrap(), base);

        let mut tx = sample();
        tx.data = vec![0xde, 0xad];
        assert_ne!(tx.safe_tx_hash().unwrap(), base);

        let mut tx = sample();
        tx.operation = SafeOperation::DelegateCall;
        assert_ne!(tx.safe_tx_hash().unwrap(), base);
    }

    #[test]
    fn test_rejects_zero_chain_and_safe() {
        let mut tx = sample();
        tx.chain_id = 0;
        assert!(tx.encode_eip712().is_err());

        let mut tx = sample();
        tx.safe_address = [0; 20];
        assert!(tx.encode_eip712().is_err());
    }

    #[test]
    fn test_value_is_decimal_string() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["value"], "1000000000000000000");
        let back: EvmSafeTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
