//! In-memory implementation of the StorageBackend trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use provenance_core::{Block, Transaction};

use crate::error::{Result, StoreError};
use crate::traits::StorageBackend;

/// In-memory backend.
///
/// All data is lost when the backend is dropped. Share it through an `Arc`
/// to reopen several ledgers against the same state.
pub struct MemoryBackend {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Block>>> {
        self.blocks
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Block>>> {
        self.blocks
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn save_block(&self, block: &Block) -> Result<()> {
        let mut blocks = self.write()?;
        if blocks.iter().any(|b| b.index == block.index) {
            return Err(StoreError::InvalidData(format!(
                "block {} already stored",
                block.index
            )));
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Block>> {
        let mut chain = self.read()?.clone();
        chain.sort_by_key(|b| b.index);
        Ok(chain)
    }

    fn clear_chain(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn replace_chain(&self, blocks: &[Block]) -> Result<()> {
        // Build the replacement first so a rejected candidate leaves the
        // stored chain untouched.
        let mut replacement: Vec<Block> = Vec::with_capacity(blocks.len());
        for block in blocks {
            if replacement.iter().any(|b| b.index == block.index) {
                return Err(StoreError::InvalidData(format!(
                    "block {} appears twice in replacement chain",
                    block.index
                )));
            }
            replacement.push(block.clone());
        }

        *self.write()? = replacement;
        Ok(())
    }

    fn block_count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    fn find_transaction_by_hash(&self, digest: &str) -> Result<Option<Transaction>> {
        let blocks = self.read()?;
        let mut ordered: Vec<&Block> = blocks.iter().collect();
        ordered.sort_by_key(|b| b.index);
        Ok(ordered
            .into_iter()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.references(digest))
            .cloned())
    }
}
