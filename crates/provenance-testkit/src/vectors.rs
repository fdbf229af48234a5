//! Golden test vectors for deterministic verification.
//!
//! Expected values come from a sorted-key JSON encoder with `", "` and
//! `": "` separators and ASCII escaping, hashed with SHA-256. Any ledger that
//! agrees on these vectors agrees on every block hash.

use serde_json::Value;

use provenance_core::{
    canonical_json, compute_root, content_digest, Block, PreviousHash, ScalarPow, Transaction,
};

/// What a golden vector exercises.
#[derive(Debug, Clone)]
pub enum VectorKind {
    /// Canonical encoding of a JSON value, and its SHA-256.
    Canonical {
        input: &'static str,
        expected_json: &'static str,
    },
    /// SHA-256 of raw content bytes, given as hex.
    Content { content_hex: &'static str },
    /// Merkle root over transactions given as JSON objects.
    MerkleRoot { transactions: &'static [&'static str] },
    /// Genesis block mined at a difficulty.
    Genesis { difficulty: u32, expected_nonce: u64 },
    /// Block 1 on top of the genesis mined at the same difficulty.
    Successor {
        difficulty: u32,
        timestamp: f64,
        transactions: &'static [&'static str],
        expected_nonce: u64,
    },
}

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub kind: VectorKind,
    /// Expected digest (hex).
    pub expected_hash: &'static str,
}

const TX_SIMPLE: &str = r#"{"sender": "A", "receiver": "B", "amount": 10}"#;
const TX_ESCAPED: &str = r#"{"image_hash": "abc", "timestamp": 1700000000.5, "note": "caf\u00e9 \"quoted\"\n"}"#;
const TX_NESTED: &str = r#"{"b": [1, 2.0, true, null], "a": {"z": 1e-7, "y": 1e22}}"#;

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "flat object sorted by key",
            kind: VectorKind::Canonical {
                input: TX_SIMPLE,
                expected_json: r#"{"amount": 10, "receiver": "B", "sender": "A"}"#,
            },
            expected_hash: "ca74d9d13d24d5b18ea81da7c7443a630af5c186948b63a0f733d45cbfe9f37c",
        },
        GoldenVector {
            name: "non-ASCII and control characters escaped",
            kind: VectorKind::Canonical {
                input: TX_ESCAPED,
                expected_json: r#"{"image_hash": "abc", "note": "caf\u00e9 \"quoted\"\n", "timestamp": 1700000000.5}"#,
            },
            expected_hash: "6963837425052534f596c668071da0c2acafc571bcc2f38d408545b8536cfda7",
        },
        GoldenVector {
            name: "nested values and float exponents",
            kind: VectorKind::Canonical {
                input: TX_NESTED,
                expected_json: r#"{"a": {"y": 1e+22, "z": 1e-07}, "b": [1, 2.0, true, null]}"#,
            },
            expected_hash: "b6b810098fb7d683d3382cf9c2fcc8dcf6379900ef53c313e2699857e88b06c2",
        },
        GoldenVector {
            name: "content digest of hello",
            kind: VectorKind::Content {
                content_hex: "68656c6c6f",
            },
            expected_hash: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        },
        GoldenVector {
            name: "empty merkle root",
            kind: VectorKind::MerkleRoot { transactions: &[] },
            expected_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
        GoldenVector {
            name: "single leaf merkle root",
            kind: VectorKind::MerkleRoot {
                transactions: &[TX_SIMPLE],
            },
            expected_hash: "ca74d9d13d24d5b18ea81da7c7443a630af5c186948b63a0f733d45cbfe9f37c",
        },
        GoldenVector {
            name: "odd merkle level duplicates last leaf",
            kind: VectorKind::MerkleRoot {
                transactions: &[TX_SIMPLE, TX_ESCAPED, TX_NESTED],
            },
            expected_hash: "bf7d96d4f959f4b5316cf86d92812ce20dc09ee526c1ae1e494a578200c0dca1",
        },
        GoldenVector {
            name: "genesis at difficulty 0",
            kind: VectorKind::Genesis {
                difficulty: 0,
                expected_nonce: 0,
            },
            expected_hash: "77d5ba08ab02489eb769275fa818ec94c3197d96c16c2eff3bf7a892d10b1d3d",
        },
        GoldenVector {
            name: "genesis at difficulty 2",
            kind: VectorKind::Genesis {
                difficulty: 2,
                expected_nonce: 461,
            },
            expected_hash: "00144588f7bfc0f8afc4f2431a0929e3b2045c8a078f6a7f73d88d263e2694d6",
        },
        GoldenVector {
            name: "genesis at difficulty 4",
            kind: VectorKind::Genesis {
                difficulty: 4,
                expected_nonce: 22931,
            },
            expected_hash: "00000d3b40c7916bb0b241e2f420711267751eac39815a2623c0668f6ebf5c22",
        },
        GoldenVector {
            name: "first block at difficulty 2",
            kind: VectorKind::Successor {
                difficulty: 2,
                timestamp: 1700000000.25,
                transactions: &[TX_SIMPLE, TX_ESCAPED, TX_NESTED],
                expected_nonce: 351,
            },
            expected_hash: "00992edd4f9a29462850dad1d76682df6ba1e63278ccbefc54ae7e6c51953aaa",
        },
    ]
}

fn parse_transactions(raw: &[&str]) -> Vec<Transaction> {
    raw.iter()
        .map(|s| {
            let value: Value = serde_json::from_str(s).expect("vector JSON");
            Transaction::from_json(value).expect("vector transaction")
        })
        .collect()
}

/// Compute the hash a vector describes. Also checks any intermediate
/// expectation (canonical text, nonce) and returns an error naming it.
pub fn compute_vector(vector: &GoldenVector) -> Result<String, String> {
    match &vector.kind {
        VectorKind::Canonical { input, expected_json } => {
            let value: Value = serde_json::from_str(input).map_err(|e| e.to_string())?;
            let encoded = canonical_json(&value);
            if encoded != *expected_json {
                return Err(format!("canonical text {}", encoded));
            }
            Ok(content_digest(encoded.as_bytes()).to_hex())
        }
        VectorKind::Content { content_hex } => {
            let bytes = hex::decode(content_hex).map_err(|e| e.to_string())?;
            Ok(content_digest(&bytes).to_hex())
        }
        VectorKind::MerkleRoot { transactions } => {
            Ok(compute_root(&parse_transactions(transactions)).to_hex())
        }
        VectorKind::Genesis {
            difficulty,
            expected_nonce,
        } => {
            let genesis = Block::genesis(&ScalarPow, *difficulty).map_err(|e| e.to_string())?;
            if genesis.nonce != *expected_nonce {
                return Err(format!("nonce {}", genesis.nonce));
            }
            Ok(genesis.hash.to_hex())
        }
        VectorKind::Successor {
            difficulty,
            timestamp,
            transactions,
            expected_nonce,
        } => {
            let genesis = Block::genesis(&ScalarPow, *difficulty).map_err(|e| e.to_string())?;
            let block = Block::new(
                1,
                parse_transactions(transactions),
                *timestamp,
                PreviousHash::Block(genesis.hash),
            )
            .seal(&ScalarPow, *difficulty)
            .map_err(|e| e.to_string())?;
            if block.nonce != *expected_nonce {
                return Err(format!("nonce {}", block.nonce));
            }
            Ok(block.hash.to_hex())
        }
    }
}

/// Verify all vectors, returning `(name, matches, actual)` for each.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| match compute_vector(v) {
            Ok(hash) => (v.name.to_string(), hash == v.expected_hash, hash),
            Err(mismatch) => (v.name.to_string(), false, mismatch),
        })
        .collect()
}
