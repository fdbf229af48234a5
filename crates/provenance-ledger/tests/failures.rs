//! Storage failures and races must leave the ledger as it was.

use std::sync::Arc;

use serde_json::Map;

use provenance_ledger::core::ScalarPow;
use provenance_ledger::store::{MemoryBackend, StorageBackend};
use provenance_ledger::sync::SyncConfig;
use provenance_ledger::{Blockchain, LedgerConfig, LedgerError, Node, PowStrategy};
use provenance_testkit::fixtures::{make_test_chain, FaultyBackend, TestFixture};

type Faulty = Arc<FaultyBackend<MemoryBackend>>;

fn make_test_config() -> LedgerConfig {
    LedgerConfig {
        difficulty: 1,
        pow: PowStrategy::Scalar,
        ..LedgerConfig::default()
    }
}

fn make_faulty_chain() -> (Faulty, Blockchain<Faulty>) {
    let storage = Arc::new(FaultyBackend::new(MemoryBackend::new()));
    let chain = Blockchain::open(Arc::clone(&storage), &make_test_config()).unwrap();
    (storage, chain)
}

#[test]
fn test_failed_persist_leaves_chain_and_mempool() {
    let fixture = TestFixture::new();
    let (storage, mut chain) = make_faulty_chain();
    chain.admit_transaction(fixture.registration(b"a", "a")).unwrap();
    chain.admit_transaction(fixture.registration(b"b", "b")).unwrap();
    let mempool = chain.mempool().to_vec();

    storage.fail_writes(true);
    assert!(matches!(chain.mine(), Err(LedgerError::Store(_))));
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.mempool(), mempool.as_slice());
    assert_eq!(storage.inner().block_count().unwrap(), 1);

    storage.fail_writes(false);
    assert_eq!(chain.mine().unwrap(), Some(1));
    assert!(chain.mempool().is_empty());
}

#[test]
fn test_failed_replace_keeps_local_chain() {
    let (storage, mut chain) = make_faulty_chain();
    let before = chain.chain().to_vec();

    storage.fail_writes(true);
    assert!(matches!(
        chain.replace_chain(make_test_chain(4, 1, "remote")),
        Err(LedgerError::Store(_))
    ));
    assert_eq!(chain.chain(), before.as_slice());
    assert_eq!(storage.inner().load_chain().unwrap(), before);
}

#[test]
fn test_failed_receive_does_not_append() {
    let (storage, mut chain) = make_faulty_chain();
    let remote = make_test_chain(2, 1, "remote");

    storage.fail_writes(true);
    assert!(chain.receive_block(remote[1].clone()).is_err());
    assert_eq!(chain.len(), 1);

    storage.fail_writes(false);
    assert!(chain.receive_block(remote[1].clone()).unwrap().is_accepted());
    assert_eq!(chain.len(), 2);
}

#[test]
fn test_open_propagates_read_failure() {
    let storage = FaultyBackend::new(MemoryBackend::new());
    storage.fail_reads(true);
    assert!(matches!(
        Blockchain::open(storage, &make_test_config()),
        Err(LedgerError::Store(_))
    ));
}

#[tokio::test]
async fn test_node_mine_failure_is_reported() {
    let (storage, chain) = make_faulty_chain();
    let node = Node::new("faulty", chain, SyncConfig::default());

    storage.fail_writes(true);
    assert!(matches!(
        node.register_content(b"photo", Map::new()).await,
        Err(LedgerError::Store(_))
    ));
    assert_eq!(node.len().await, 1);
    assert_eq!(node.mempool().await.len(), 1);

    storage.fail_writes(false);
    assert_eq!(node.mine().await.unwrap(), Some(1));
    assert!(node.verify_content(b"photo").await.unwrap().is_some());
}

#[tokio::test]
async fn test_block_mined_on_stale_tip_is_refused() {
    let fixture = TestFixture::new();
    let (_storage, chain) = make_faulty_chain();
    let node = Node::new("racer", chain, SyncConfig::default());
    node.submit_transaction(fixture.registration(b"first", "first"))
        .await
        .unwrap();

    let job = node.blockchain().read().await.prepare_mining().unwrap();
    assert_eq!(node.mine().await.unwrap(), Some(1));

    let sealed = tokio::task::spawn_blocking(move || job.run(&ScalarPow))
        .await
        .unwrap()
        .unwrap();
    let result = node.blockchain().write().await.commit_mined(sealed);
    assert!(matches!(result, Err(LedgerError::StaleBlock { index: 1 })));
    assert_eq!(node.len().await, 2);
}

#[tokio::test]
async fn test_concurrent_mining_commits_once() {
    let fixture = TestFixture::new();
    let (_storage, chain) = make_faulty_chain();
    let node = Arc::new(Node::new("busy", chain, SyncConfig::default()));
    node.submit_transaction(fixture.registration(b"shared", "shared"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.mine().await })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Some(_)) => committed += 1,
            Ok(None) | Err(LedgerError::StaleBlock { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(node.len().await, 2);
    assert!(node.mempool().await.is_empty());
}
