//! # Provenance Core
//!
//! Pure primitives for the provenance ledger: canonical hashing, transactions,
//! blocks, Merkle commitments, proof-of-work and validation.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over hash-linked data structures.
//!
//! ## Key Types
//!
//! - [`Transaction`] - An open registration record with well-known fields
//! - [`Block`] - A header plus the transactions it commits to
//! - [`Digest`] - A SHA-256 digest, lowercase hex on the wire
//! - [`ProofOfWork`] - Nonce search strategy ([`ScalarPow`], [`ParallelPow`])
//! - [`KeyPair`] / [`PublicKey`] - RSA-PSS transaction signing
//!
//! ## Canonicalization
//!
//! Every digest is taken over sorted-key JSON. See the [`canonical`] module.

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod pow;
pub mod transaction;
pub mod types;
pub mod validation;

pub use block::{Block, BlockHeader, GENESIS_TIMESTAMP};
pub use canonical::{canonical_bytes, canonical_hash, canonical_json};
pub use crypto::{content_digest, verify_signature, KeyPair, PublicKey, DEFAULT_KEY_BITS};
pub use error::{CoreError, ValidationError};
pub use merkle::{compute_root, compute_root_parallel};
pub use pow::{ParallelPow, PowStrategy, ProofOfWork, ScalarPow, MAX_DIFFICULTY};
pub use transaction::Transaction;
pub use types::{Digest, PreviousHash};
pub use validation::{
    classify_block, is_valid_block, is_valid_chain, validate_block, validate_chain, validate_genesis,
    BlockReception,
};
