//! Error types for the provenance core.

use thiserror::Error;

/// Core errors that can occur while encoding, hashing, signing, or mining.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("field {key} must be a string")]
    InvalidField { key: String },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("difficulty {0} exceeds the 64 hex characters of a digest")]
    DifficultyTooHigh(u32),

    #[error("nonce space exhausted without meeting difficulty {0}")]
    NonceSpaceExhausted(u32),
}

/// Validation errors for block and chain structure.
///
/// Every variant is recoverable: the offending block or chain is rejected and
/// the local chain is left as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chain is empty")]
    EmptyChain,

    #[error("invalid genesis block: {0}")]
    InvalidGenesis(String),

    #[error("invalid index: expected {expected}, got {got}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },

    #[error("block {index} hash does not match its header")]
    HashMismatch { index: u64 },

    #[error("block {index} merkle root does not match its transactions")]
    MerkleRootMismatch { index: u64 },

    #[error("block {index} has {actual} leading zeros, difficulty requires {required}")]
    InsufficientWork {
        index: u64,
        required: u32,
        actual: u32,
    },
}
