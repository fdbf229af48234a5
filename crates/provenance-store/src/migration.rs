//! Database schema migrations for SQLite.
//!
//! Versions are recorded in `schema_migrations`. Databases written before
//! versioning existed have no such table and start at version 0, so every
//! step here must tolerate tables that already exist.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 3;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        info!(from = current, to = CURRENT_VERSION, "migrated ledger schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        3 => apply_v3(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: block and transaction tables.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            idx INTEGER PRIMARY KEY,
            timestamp REAL,
            previous_hash TEXT,
            hash TEXT,
            nonce INTEGER,
            merkle_root TEXT
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            block_idx INTEGER,
            image_hash TEXT,      -- denormalized for lookup
            source_hash TEXT,     -- denormalized for lookup
            data TEXT,            -- canonical JSON of the whole transaction
            FOREIGN KEY(block_idx) REFERENCES blocks(idx)
        );
        "#,
    )?;

    Ok(())
}

/// Migration v2: `merkle_root` on block tables that predate it.
fn apply_v2(conn: &Connection) -> Result<()> {
    let has_merkle_root = conn
        .prepare("PRAGMA table_info(blocks)")?
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .iter()
        .any(|column| column == "merkle_root");

    if !has_merkle_root {
        conn.execute("ALTER TABLE blocks ADD COLUMN merkle_root TEXT", [])?;
    }

    Ok(())
}

/// Migration v3: lookup indexes.
fn apply_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_idx);
        CREATE INDEX IF NOT EXISTS idx_transactions_image_hash ON transactions(image_hash);
        CREATE INDEX IF NOT EXISTS idx_transactions_source_hash ON transactions(source_hash);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
