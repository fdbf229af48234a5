//! # Provenance Ledger
//!
//! A proof-of-work chain of content registrations. A node registers the
//! SHA-256 digest of a piece of content in a transaction, mines it into a
//! block, and can later prove when (and by whom) the content was registered.
//!
//! ## Overview
//!
//! - [`Blockchain`] is the synchronous state machine: mempool admission,
//!   mining, validation, longest-chain replacement and lookup
//! - [`Node`] shares a `Blockchain` behind a single-writer lock, mines off
//!   the lock, and talks to peers
//! - [`LedgerConfig`] carries every setting, with defaults and `TP_*`
//!   environment overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provenance_ledger::{Blockchain, LedgerConfig, Node};
//!
//! async fn example() -> provenance_ledger::Result<()> {
//!     let config = LedgerConfig::from_env()?;
//!     let storage = config.open_storage()?;
//!     let chain = Blockchain::open(storage, &config)?;
//!     let node = Node::from_config(&config, chain)?;
//!
//!     let digest = node
//!         .register_content(b"picture bytes", serde_json::Map::new())
//!         .await?;
//!     assert!(node.verify_content(b"picture bytes").await?.is_some());
//!     println!("registered {}", digest);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! The component crates are re-exported for convenience:
//!
//! - `provenance_ledger::core` - Blocks, transactions, hashing, proof-of-work
//! - `provenance_ledger::conditions` - Transaction precondition language
//! - `provenance_ledger::store` - Storage abstraction and SQLite
//! - `provenance_ledger::sync` - Peers and conflict resolution

pub mod blockchain;
pub mod config;
pub mod error;
pub mod node;

pub use blockchain::{Blockchain, MiningJob};
pub use config::{LedgerConfig, StorageKind};
pub use error::{AdmissionError, LedgerError, Result};
pub use node::Node;

pub use provenance_conditions as conditions;
pub use provenance_core as core;
pub use provenance_store as store;
pub use provenance_sync as sync;

// Re-export commonly used core types
pub use provenance_core::{
    content_digest, Block, BlockReception, Digest, KeyPair, PowStrategy, PreviousHash, Transaction,
};
