//! Golden vectors checked through the ledger's public re-exports.
//!
//! Every node must derive identical canonical text, Merkle roots and block
//! hashes, or chains mined on one node will not validate on another.

use provenance_ledger::core::{canonical_json, Block, ScalarPow};
use provenance_ledger::{Blockchain, LedgerConfig, PowStrategy, StorageKind};
use provenance_testkit::vectors::{all_vectors, verify_all_vectors, VectorKind};

#[test]
fn test_golden_vectors() {
    let results = verify_all_vectors();
    assert_eq!(results.len(), all_vectors().len());
    for (name, ok, actual) in results {
        assert!(ok, "vector '{}' produced {}", name, actual);
    }
}

#[test]
fn test_genesis_is_shared_by_fresh_ledgers() {
    for vector in all_vectors() {
        let VectorKind::Genesis { difficulty, .. } = vector.kind else {
            continue;
        };
        let config = LedgerConfig {
            difficulty,
            storage_backend: StorageKind::Memory,
            ..LedgerConfig::default()
        };
        let chain = Blockchain::open(config.open_storage().unwrap(), &config).unwrap();
        assert_eq!(chain.chain()[0].hash.to_hex(), vector.expected_hash, "{}", vector.name);
    }
}

#[test]
fn test_pow_strategies_agree_on_genesis() -> anyhow::Result<()> {
    let scalar = Block::genesis(&ScalarPow, 3)?;
    let parallel = Block::genesis(&PowStrategy::Parallel, 3)?;
    assert_eq!(scalar, parallel);
    assert_eq!(
        canonical_json(&serde_json::to_value(&scalar.header().previous_hash)?),
        "\"0\""
    );
    Ok(())
}
