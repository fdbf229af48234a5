//! Blocks: a five-field header plus the transaction body it commits to.
//!
//! The header hashed for identity and proof-of-work is exactly
//! `{index, merkle_root, nonce, previous_hash, timestamp}` in canonical form.
//! The transaction list is never hashed directly; it is bound to the header
//! only through `merkle_root`.

use serde::{Deserialize, Serialize};

use crate::canonical::{encode_float, encode_str};
use crate::error::CoreError;
use crate::merkle::compute_root;
use crate::pow::ProofOfWork;
use crate::transaction::Transaction;
use crate::types::{Digest, PreviousHash};

/// Timestamp of the genesis block. Fixed so every node derives the same one.
pub const GENESIS_TIMESTAMP: f64 = 0.0;

/// The hashed portion of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: f64,
    pub previous_hash: PreviousHash,
    pub nonce: u64,
    pub merkle_root: Digest,
}

impl BlockHeader {
    /// Split the canonical header around the nonce.
    ///
    /// `nonce` is the only field that varies during mining, so a miner can
    /// encode the rest once and splice decimal nonces in between.
    pub fn split_at_nonce(&self) -> (String, String) {
        let mut prefix = String::with_capacity(128);
        prefix.push_str("{\"index\": ");
        prefix.push_str(&self.index.to_string());
        prefix.push_str(", \"merkle_root\": ");
        encode_str(&mut prefix, &self.merkle_root.to_hex());
        prefix.push_str(", \"nonce\": ");

        let mut suffix = String::with_capacity(128);
        suffix.push_str(", \"previous_hash\": ");
        encode_str(&mut suffix, &self.previous_hash.to_hex());
        suffix.push_str(", \"timestamp\": ");
        encode_float(&mut suffix, self.timestamp);
        suffix.push('}');

        (prefix, suffix)
    }

    /// Canonical JSON of the header.
    pub fn canonical_json(&self) -> String {
        let (prefix, suffix) = self.split_at_nonce();
        format!("{}{}{}", prefix, self.nonce, suffix)
    }

    /// SHA-256 of the canonical header.
    pub fn hash(&self) -> Digest {
        Digest::hash(self.canonical_json().as_bytes())
    }

    /// Copy of this header with a different nonce.
    pub fn with_nonce(&self, nonce: u64) -> Self {
        Self { nonce, ..*self }
    }
}

/// A block of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: PreviousHash,
    pub nonce: u64,
    pub merkle_root: Digest,
    pub hash: Digest,
}

impl Block {
    /// Assemble an unsealed block.
    ///
    /// The Merkle root is computed from `transactions`, the nonce starts at
    /// zero and `hash` holds the digest of that placeholder header until
    /// [`seal`](Self::seal) runs proof-of-work.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        timestamp: f64,
        previous_hash: PreviousHash,
    ) -> Self {
        let merkle_root = compute_root(&transactions);
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            merkle_root,
            hash: Digest::empty(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// The mined genesis block for `difficulty`.
    pub fn genesis(pow: &dyn ProofOfWork, difficulty: u32) -> Result<Self, CoreError> {
        Self::new(0, Vec::new(), GENESIS_TIMESTAMP, PreviousHash::Genesis).seal(pow, difficulty)
    }

    /// Run proof-of-work and fix `nonce` and `hash`.
    pub fn seal(mut self, pow: &dyn ProofOfWork, difficulty: u32) -> Result<Self, CoreError> {
        let (nonce, hash) = pow.find_proof(&self.header(), difficulty)?;
        self.nonce = nonce;
        self.hash = hash;
        Ok(self)
    }

    /// The hashed header fields.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            nonce: self.nonce,
            merkle_root: self.merkle_root,
        }
    }

    /// Hash of the header as it currently stands. Never reads `hash`.
    pub fn recompute_hash(&self) -> Digest {
        self.header().hash()
    }

    /// Merkle root derived from the transaction body.
    pub fn compute_merkle_root(&self) -> Digest {
        compute_root(&self.transactions)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
