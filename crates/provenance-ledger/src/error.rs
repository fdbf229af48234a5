//! Error types for the ledger.

use provenance_conditions::ConditionError;
use provenance_core::{CoreError, ValidationError};
use provenance_store::StoreError;
use provenance_sync::SyncError;
use thiserror::Error;

/// Why a transaction was refused entry to the mempool.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    /// The signature does not verify against the embedded public key.
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// The signature check failed for a reason unrelated to the key or
    /// signature, such as the payload failing to encode.
    #[error("signature could not be checked: {0}")]
    Unverifiable(String),

    /// The ledger requires signatures and the transaction carries none.
    #[error("transaction must be signed")]
    SignatureRequired,

    /// The declared condition evaluated to false.
    #[error("condition not satisfied: {0}")]
    ConditionFailed(String),

    /// The declared condition could not be evaluated.
    #[error("condition error: {0}")]
    ConditionError(#[from] ConditionError),
}

impl From<CoreError> for AdmissionError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature => Self::InvalidSignature,
            CoreError::InvalidPublicKey(reason) => Self::MalformedPublicKey(reason),
            CoreError::MalformedSignature(reason) => Self::MalformedSignature(reason),
            other => Self::Unverifiable(other.to_string()),
        }
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// A sealed block no longer extends the tip it was mined against.
    #[error("block {index} was mined against a stale tip")]
    StaleBlock { index: u64 },

    /// The persisted chain failed validation on open.
    #[error("stored chain is corrupt: {0}")]
    CorruptChain(ValidationError),

    /// The content digest is already registered or pending.
    #[error("content already registered: {0}")]
    DuplicateRegistration(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The background mining task failed to complete.
    #[error("mining task failed: {0}")]
    Mining(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_admission_errors() {
        assert_eq!(
            AdmissionError::from(CoreError::InvalidSignature),
            AdmissionError::InvalidSignature
        );
        assert_eq!(
            AdmissionError::from(CoreError::InvalidPublicKey("pem".into())),
            AdmissionError::MalformedPublicKey("pem".into())
        );
        assert_eq!(
            AdmissionError::from(CoreError::MalformedSignature("base64".into())),
            AdmissionError::MalformedSignature("base64".into())
        );
        assert_eq!(
            AdmissionError::from(CoreError::Encoding("nan".into())),
            AdmissionError::Unverifiable("encoding error: nan".into())
        );
    }
}
