//! Error types for the custody signer

use thiserror::Error;

use crate::pipeline::ApprovalStage;

/// Result type alias for signer operations
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Errors surfaced by the custody signer
#[derive(Debug, Error)]
pub enum CustodyError {
    /// Root secret bytes have the wrong length (corrupted key material)
    #[error("Invalid seed length: expected {expected} bytes, got {actual}")]
    InvalidSeedLength { expected: usize, actual: usize },

    /// Threshold or participant invariant violated
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// User presence check was denied, cancelled, or timed out
    #[error("User presence required")]
    UserPresenceRequired,

    /// The device key could not sign
    #[error("Signing failed: {0}")]
    SigningFailure(#[source] Box<CustodyError>),

    /// The root secret could not be loaded or derived from
    #[error("Derivation failed: {0}")]
    DerivationFailure(#[source] Box<CustodyError>),

    /// Approval pipeline failed at `stage`
    #[error("Approval signing failed at {stage}: {cause}")]
    ApprovalSigning {
        stage: ApprovalStage,
        #[source]
        cause: Box<CustodyError>,
    },

    #[error("No root secret stored for this account")]
    RootSecretMissing,

    #[error("Device is not enrolled")]
    DeviceNotEnrolled,

    #[error("Device is already enrolled")]
    DeviceAlreadyEnrolled,

    /// Secret store failure
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[source] quorum_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CustodyError {
    /// Whether a presence prompt is the root cause
    pub fn requires_user_presence(&self) -> bool {
        match self {
            CustodyError::UserPresenceRequired => true,
            CustodyError::SigningFailure(cause)
            | CustodyError::DerivationFailure(cause)
            | CustodyError::ApprovalSigning { cause, .. } => cause.requires_user_presence(),
            _ => false,
        }
    }

    /// Whether retrying (after a re-prompt or once the store is back) can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            CustodyError::UserPresenceRequired | CustodyError::Store(_) | CustodyError::Io(_) => {
                true
            }
            CustodyError::SigningFailure(cause)
            | CustodyError::DerivationFailure(cause)
            | CustodyError::ApprovalSigning { cause, .. } => cause.is_recoverable(),
            _ => false,
        }
    }
}

impl From<quorum_core::Error> for CustodyError {
    fn from(e: quorum_core::Error) -> Self {
        match e {
            quorum_core::Error::InvalidSeedLength { expected, actual } => {
                CustodyError::InvalidSeedLength { expected, actual }
            }
            quorum_core::Error::InvalidPolicy(msg) => CustodyError::InvalidPolicy(msg),
            other => CustodyError::Core(other),
        }
    }
}

impl From<bitcode::Error> for CustodyError {
    fn from(e: bitcode::Error) -> Self {
        CustodyError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(e: serde_json::Error) -> Self {
        CustodyError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_taxonomy() {
        let seed: CustodyError = quorum_core::Error::InvalidSeedLength {
            expected: 64,
            actual: 12,
        }
        .into();
        assert!(matches!(
            seed,
            CustodyError::InvalidSeedLength {
                expected: 64,
                actual: 12
            }
        ));

        let policy: CustodyError = quorum_core::Error::InvalidPolicy("t > n".into()).into();
        assert!(matches!(policy, CustodyError::InvalidPolicy(_)));

        let other: CustodyError = quorum_core::Error::Crypto("x".into()).into();
        assert!(matches!(other, CustodyError::Core(_)));
    }

    #[test]
    fn test_presence_is_found_through_wrappers() {
        let err = CustodyError::ApprovalSigning {
            stage: ApprovalStage::KeyResolved,
            cause: Box::new(CustodyError::DerivationFailure(Box::new(
                CustodyError::UserPresenceRequired,
            ))),
        };
        assert!(err.requires_user_presence());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_fatal_errors_are_not_recoverable() {
        assert!(!CustodyError::InvalidSeedLength {
            expected: 64,
            actual: 0
        }
        .is_recoverable());
        assert!(!CustodyError::InvalidPolicy("x".into()).is_recoverable());
        assert!(!CustodyError::SigningFailure(Box::new(CustodyError::DeviceNotEnrolled))
            .is_recoverable());
    }
}
