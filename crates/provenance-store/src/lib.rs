//! # Provenance Store
//!
//! Storage abstraction for the provenance ledger. Provides a trait-based
//! interface for chain persistence with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`StorageBackend`] - The trait for all storage operations
//! - [`SqliteBackend`] - SQLite-based persistent storage
//! - [`MemoryBackend`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provenance_store::{SqliteBackend, StorageBackend};
//!
//! fn example() -> provenance_store::Result<()> {
//!     let store = SqliteBackend::open("data/ledger.db")?;
//!     let chain = store.load_chain()?;
//!     println!("{} blocks on disk", chain.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic writes**: a block and its transactions commit together, and
//!   `replace_chain` swaps the whole chain inside one SQL transaction
//! - **Legacy databases**: tables created before the `merkle_root` column
//!   existed are migrated in place, and missing roots are recomputed on load

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use traits::StorageBackend;
