//! # Provenance Testkit
//!
//! Testing utilities for the provenance ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Canonical encodings, Merkle roots and mined hashes
//!   with known expected outputs
//! - **Generators**: Proptest strategies for transactions and digests
//! - **Fixtures**: Key pairs, ready-made chains and a storage backend that
//!   fails on demand
//!
//! ## Golden Vectors
//!
//! ```rust
//! use provenance_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, got) in verify_all_vectors() {
//!     assert!(ok, "{}: got {}", name, got);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use provenance_testkit::fixtures::{make_test_chain, FaultyBackend};
//! use provenance_store::{MemoryBackend, StorageBackend};
//!
//! let chain = make_test_chain(3, 1, "demo");
//! let store = FaultyBackend::new(MemoryBackend::new());
//! store.fail_writes(true);
//! assert!(store.save_block(&chain[0]).is_err());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{make_test_chain, FaultyBackend, TestFixture};
pub use generators::{transaction, TransactionParams};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
