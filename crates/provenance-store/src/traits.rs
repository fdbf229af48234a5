//! StorageBackend trait: the abstract interface for chain persistence.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::sync::Arc;

use provenance_core::{Block, Transaction};

use crate::error::Result;

/// Persistence for a hash-linked chain of blocks.
///
/// Calls are synchronous: the ledger engine is a single-writer state machine
/// and persists under its own write lock.
///
/// # Contract
///
/// - **All or nothing**: `save_block` stores a block with every one of its
///   transactions or nothing at all. `replace_chain` swaps the whole chain or
///   leaves the previous one in place.
/// - **Order**: `load_chain` returns blocks ascending by index, each with its
///   transactions in the order they were saved.
/// - **Opaque bodies**: transactions round-trip with every field intact.
pub trait StorageBackend: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Chain Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Durably append one block and its transactions.
    fn save_block(&self, block: &Block) -> Result<()>;

    /// All persisted blocks in ascending index order. Empty when nothing is
    /// stored.
    fn load_chain(&self) -> Result<Vec<Block>>;

    /// Delete every block and transaction.
    fn clear_chain(&self) -> Result<()>;

    /// Atomically replace the persisted chain with `blocks`.
    fn replace_chain(&self, blocks: &[Block]) -> Result<()>;

    /// Number of persisted blocks.
    fn block_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// The earliest persisted transaction whose `image_hash` or `source_hash`
    /// equals `digest`.
    fn find_transaction_by_hash(&self, digest: &str) -> Result<Option<Transaction>>;
}

impl<S: StorageBackend + ?Sized> StorageBackend for Arc<S> {
    fn save_block(&self, block: &Block) -> Result<()> {
        (**self).save_block(block)
    }

    fn load_chain(&self) -> Result<Vec<Block>> {
        (**self).load_chain()
    }

    fn clear_chain(&self) -> Result<()> {
        (**self).clear_chain()
    }

    fn replace_chain(&self, blocks: &[Block]) -> Result<()> {
        (**self).replace_chain(blocks)
    }

    fn block_count(&self) -> Result<u64> {
        (**self).block_count()
    }

    fn find_transaction_by_hash(&self, digest: &str) -> Result<Option<Transaction>> {
        (**self).find_transaction_by_hash(digest)
    }
}

impl<S: StorageBackend + ?Sized> StorageBackend for Box<S> {
    fn save_block(&self, block: &Block) -> Result<()> {
        (**self).save_block(block)
    }

    fn load_chain(&self) -> Result<Vec<Block>> {
        (**self).load_chain()
    }

    fn clear_chain(&self) -> Result<()> {
        (**self).clear_chain()
    }

    fn replace_chain(&self, blocks: &[Block]) -> Result<()> {
        (**self).replace_chain(blocks)
    }

    fn block_count(&self) -> Result<u64> {
        (**self).block_count()
    }

    fn find_transaction_by_hash(&self, digest: &str) -> Result<Option<Transaction>> {
        (**self).find_transaction_by_hash(digest)
    }
}
