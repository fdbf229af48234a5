//! # Provenance Sync
//!
//! Peer abstraction and conflict resolution for the provenance ledger.
//!
//! ## Overview
//!
//! Nodes converge by the longest-valid-chain rule: a node asks its peers for
//! their chains and adopts the longest one that is strictly longer than its
//! own and passes full validation. Newly mined blocks are announced to peers
//! individually; a peer that cannot append an announced block directly falls
//! back to the same resolution.
//!
//! ## Key Types
//!
//! - [`Peer`] - A remote node: fetch its chain, send it a block
//! - [`PeerSet`] - Registry of known peers
//! - [`ConflictResolver`] - Fetch candidates and pick the winner
//! - [`MemoryNetwork`] - In-process peers for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use provenance_sync::{ConflictResolver, Peer, SyncConfig};
//!
//! async fn example(peers: Vec<Arc<dyn Peer>>, local_len: usize) {
//!     let resolver = ConflictResolver::new(SyncConfig::default());
//!     let (winner, report) = resolver.resolve(local_len, &peers, 4).await;
//!     if let Some(candidate) = winner {
//!         println!("adopting {} blocks from {}", candidate.chain.len(), candidate.peer);
//!     }
//!     println!("{} peers unreachable", report.unreachable);
//! }
//! ```

pub mod error;
pub mod memory;
pub mod peer;
pub mod resolver;

pub use error::{Result, SyncError};
pub use memory::{MemoryNetwork, MemoryPeer, PeerHandler};
pub use peer::{ChainResponse, Peer, PeerId, PeerSet};
pub use resolver::{select_longest_valid, Candidate, ConflictResolver, ResolutionReport, SyncConfig};
