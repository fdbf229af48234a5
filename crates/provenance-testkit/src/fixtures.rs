//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::RngCore;
use serde_json::json;

use provenance_core::{content_digest, Block, KeyPair, PreviousHash, ScalarPow, Transaction};
use provenance_store::{StorageBackend, StoreError};

/// Key size for test keys. Small enough to generate quickly.
pub const TEST_KEY_BITS: usize = 1024;

/// A test fixture holding a signing key.
pub struct TestFixture {
    pub keypair: KeyPair,
}

impl TestFixture {
    /// Create a new test fixture with a random key pair.
    pub fn new() -> Self {
        Self {
            keypair: KeyPair::generate(TEST_KEY_BITS).expect("key generation"),
        }
    }

    /// An unsigned registration of `content`.
    pub fn registration(&self, content: &[u8], filename: &str) -> Transaction {
        Transaction::from_json(json!({
            "image_hash": content_digest(content).to_hex(),
            "filename": filename,
        }))
        .expect("registration fields")
    }

    /// A registration of `content`, signed with the fixture's key.
    pub fn signed_registration(&self, content: &[u8], filename: &str) -> Transaction {
        let mut tx = self.registration(content, filename);
        tx.sign(&self.keypair).expect("signing");
        tx
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Random content bytes of `len` bytes.
pub fn random_content(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// A valid chain of `len` blocks at `difficulty`, one transaction per block
/// after genesis. Different `tag`s give different chains.
pub fn make_test_chain(len: usize, difficulty: u32, tag: &str) -> Vec<Block> {
    let mut chain = vec![Block::genesis(&ScalarPow, difficulty).expect("genesis")];
    extend_chain(&mut chain, len, difficulty, tag);
    chain
}

/// Mine blocks onto `chain` until it holds `len` blocks.
pub fn extend_chain(chain: &mut Vec<Block>, len: usize, difficulty: u32, tag: &str) {
    while chain.len() < len {
        let prev = chain.last().expect("chain has genesis");
        let seq = chain.len();
        let tx = Transaction::from_json(json!({
            "image_hash": content_digest(format!("{}-{}", tag, seq).as_bytes()).to_hex(),
            "tag": tag,
            "seq": seq,
        }))
        .expect("fixture transaction");
        let block = Block::new(prev.index + 1, vec![tx], seq as f64, PreviousHash::Block(prev.hash))
            .seal(&ScalarPow, difficulty)
            .expect("seal");
        chain.push(block);
    }
}

/// A storage backend wrapper that fails on demand.
///
/// Reads and writes pass through to the inner backend until a failure is
/// switched on with [`fail_writes`](Self::fail_writes) or
/// [`fail_reads`](Self::fail_reads).
pub struct FaultyBackend<S> {
    inner: S,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl<S: StorageBackend> FaultyBackend<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> provenance_store::Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected {} failure", what),
            )));
        }
        Ok(())
    }

    fn write<T>(&self, op: impl FnOnce(&S) -> provenance_store::Result<T>) -> provenance_store::Result<T> {
        self.check(&self.fail_writes, "write")?;
        let result = op(&self.inner)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }
}

impl<S: StorageBackend> StorageBackend for FaultyBackend<S> {
    fn save_block(&self, block: &Block) -> provenance_store::Result<()> {
        self.write(|s| s.save_block(block))
    }

    fn load_chain(&self) -> provenance_store::Result<Vec<Block>> {
        self.check(&self.fail_reads, "read")?;
        self.inner.load_chain()
    }

    fn clear_chain(&self) -> provenance_store::Result<()> {
        self.write(|s| s.clear_chain())
    }

    fn replace_chain(&self, blocks: &[Block]) -> provenance_store::Result<()> {
        self.write(|s| s.replace_chain(blocks))
    }

    fn block_count(&self) -> provenance_store::Result<u64> {
        self.check(&self.fail_reads, "read")?;
        self.inner.block_count()
    }

    fn find_transaction_by_hash(&self, digest: &str) -> provenance_store::Result<Option<Transaction>> {
        self.check(&self.fail_reads, "read")?;
        self.inner.find_transaction_by_hash(digest)
    }
}
