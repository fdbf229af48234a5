//! SQLite implementation of the StorageBackend trait.
//!
//! This is the durable backend. Each block is one row in `blocks` and each
//! transaction one row in `transactions`, with the full body kept as
//! canonical JSON and `image_hash` / `source_hash` copied out for lookup.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use provenance_core::{canonical_json, Block, Digest, PreviousHash, Transaction};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::StorageBackend;

/// SQLite-based backend.
///
/// Thread-safe via internal Mutex.
pub struct SqliteBackend {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.display(), "opened sqlite backend");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("connection mutex: {}", e)))?;
        f(&conn)
    }

    /// Execute a blocking operation that needs mutable access.
    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("connection mutex: {}", e)))?;
        f(&mut conn)
    }
}

fn to_sql_int(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidData(format!("{} {} out of range", what, value)))
}

fn from_sql_int(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative {} {}", what, value)))
}

/// Insert one block and its transactions on `conn`.
///
/// Callers wrap this in a SQL transaction.
fn insert_block(conn: &Connection, block: &Block) -> Result<()> {
    let idx = to_sql_int(block.index, "block index")?;
    conn.execute(
        "INSERT INTO blocks (idx, timestamp, previous_hash, hash, nonce, merkle_root)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            idx,
            block.timestamp,
            block.previous_hash.to_hex(),
            block.hash.to_hex(),
            to_sql_int(block.nonce, "nonce")?,
            block.merkle_root.to_hex(),
        ],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO transactions (block_idx, image_hash, source_hash, data) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for tx in &block.transactions {
        stmt.execute(params![
            idx,
            tx.image_hash(),
            tx.source_hash(),
            canonical_json(&tx.to_json()),
        ])?;
    }

    Ok(())
}

fn decode_transaction(data: &str) -> Result<Transaction> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Transaction::from_json(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Raw `blocks` row.
struct BlockRow {
    idx: i64,
    timestamp: f64,
    previous_hash: String,
    hash: String,
    nonce: i64,
    merkle_root: Option<String>,
}

impl BlockRow {
    fn into_block(self, transactions: Vec<Transaction>) -> Result<Block> {
        let index = from_sql_int(self.idx, "block index")?;
        let invalid = |field: &str, e: provenance_core::CoreError| {
            StoreError::InvalidData(format!("block {} {}: {}", index, field, e))
        };

        let previous_hash =
            PreviousHash::from_hex(&self.previous_hash).map_err(|e| invalid("previous_hash", e))?;
        let hash = Digest::from_hex(&self.hash).map_err(|e| invalid("hash", e))?;

        let mut block = Block {
            index,
            timestamp: self.timestamp,
            transactions,
            previous_hash,
            nonce: from_sql_int(self.nonce, "nonce")?,
            merkle_root: Digest::empty(),
            hash,
        };
        block.merkle_root = match self.merkle_root {
            Some(root) => Digest::from_hex(&root).map_err(|e| invalid("merkle_root", e))?,
            None => {
                // Rows written before the column existed.
                warn!(index, "block has no stored merkle root, recomputing");
                block.compute_merkle_root()
            }
        };
        Ok(block)
    }
}

impl StorageBackend for SqliteBackend {
    fn save_block(&self, block: &Block) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_block(&tx, block)?;
            tx.commit()?;
            debug!(index = block.index, txs = block.transactions.len(), "saved block");
            Ok(())
        })
    }

    fn load_chain(&self) -> Result<Vec<Block>> {
        self.with_conn(|conn| {
            let mut blocks_stmt = conn.prepare(
                "SELECT idx, timestamp, previous_hash, hash, nonce, merkle_root
                 FROM blocks ORDER BY idx ASC",
            )?;
            let rows = blocks_stmt
                .query_map([], |row| {
                    Ok(BlockRow {
                        idx: row.get("idx")?,
                        timestamp: row.get("timestamp")?,
                        previous_hash: row.get("previous_hash")?,
                        hash: row.get("hash")?,
                        nonce: row.get("nonce")?,
                        merkle_root: row.get("merkle_root")?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut tx_stmt =
                conn.prepare("SELECT data FROM transactions WHERE block_idx = ?1 ORDER BY id ASC")?;
            let mut chain = Vec::with_capacity(rows.len());
            for row in rows {
                let bodies = tx_stmt
                    .query_map(params![row.idx], |r| r.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let transactions = bodies
                    .iter()
                    .map(|data| decode_transaction(data))
                    .collect::<Result<Vec<_>>>()?;
                chain.push(row.into_block(transactions)?);
            }

            Ok(chain)
        })
    }

    fn clear_chain(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM transactions", [])?;
            tx.execute("DELETE FROM blocks", [])?;
            tx.commit()?;
            Ok(())
        })
    }

    fn replace_chain(&self, blocks: &[Block]) -> Result<()> {
        self.with_conn_mut(|conn| {
            // Dropping `tx` on any error rolls back to the previous chain.
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM transactions", [])?;
            tx.execute("DELETE FROM blocks", [])?;
            for block in blocks {
                insert_block(&tx, block)?;
            }
            tx.commit()?;
            debug!(len = blocks.len(), "replaced stored chain");
            Ok(())
        })
    }

    fn block_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
            from_sql_int(count, "block count")
        })
    }

    fn find_transaction_by_hash(&self, digest: &str) -> Result<Option<Transaction>> {
        self.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM transactions
                     WHERE image_hash = ?1 OR source_hash = ?1
                     ORDER BY block_idx ASC, id ASC LIMIT 1",
                    params![digest],
                    |row| row.get(0),
                )
                .optional()?;
            data.as_deref().map(decode_transaction).transpose()
        })
    }
}
