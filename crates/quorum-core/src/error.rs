//! Error types for the Quorum core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid seed length: expected {expected} bytes, got {actual}")]
    InvalidSeedLength { expected: usize, actual: usize },

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("HD derivation error: {0}")]
    Derivation(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Address encoding error: {0}")]
    InvalidAddress(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}
