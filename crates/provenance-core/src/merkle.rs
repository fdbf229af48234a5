//! Merkle commitment over an ordered transaction list.
//!
//! Leaves are `SHA-256(canonical(tx))`. Interior nodes hash the *hex text* of
//! their two children concatenated, not the raw digest bytes, and an odd level
//! duplicates its last node. Both rules are part of the block format.

use rayon::prelude::*;

use crate::transaction::Transaction;
use crate::types::Digest;

/// Leaf count below which the parallel variant stays sequential.
const PARALLEL_THRESHOLD: usize = 64;

/// Hash of one transaction.
pub fn leaf_hash(tx: &Transaction) -> Digest {
    tx.leaf_hash()
}

/// Combine two child hashes: `SHA-256(hex(a) || hex(b))`.
pub fn combine(a: &Digest, b: &Digest) -> Digest {
    let mut text = String::with_capacity(128);
    text.push_str(&a.to_hex());
    text.push_str(&b.to_hex());
    Digest::hash(text.as_bytes())
}

/// Compute the Merkle root of `transactions`.
pub fn compute_root(transactions: &[Transaction]) -> Digest {
    if transactions.is_empty() {
        return Digest::empty();
    }
    let mut level: Vec<Digest> = transactions.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Compute the Merkle root with leaf hashing and each level fanned out
/// across the rayon pool. Always equal to [`compute_root`].
pub fn compute_root_parallel(transactions: &[Transaction]) -> Digest {
    if transactions.len() < PARALLEL_THRESHOLD {
        return compute_root(transactions);
    }
    let mut level: Vec<Digest> = transactions.par_iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = if level.len() < PARALLEL_THRESHOLD {
            next_level(&level)
        } else {
            level
                .par_chunks(2)
                .map(|pair| combine(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect()
        };
    }
    level[0]
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| combine(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect()
}
