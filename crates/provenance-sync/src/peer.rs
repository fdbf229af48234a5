//! Peer abstraction.
//!
//! A peer is anything that can hand over its full chain and accept a newly
//! mined block. Implementations may use HTTP or any other transport.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use provenance_core::{Block, BlockReception};

use crate::error::{Result, SyncError};

/// Identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A peer's answer to a chain request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    /// Advertised length. Must equal `chain.len()`.
    pub length: u64,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len() as u64;
        Self { chain, length }
    }

    /// The chain, after checking the advertised length.
    pub fn into_chain(self, peer: &PeerId) -> Result<Vec<Block>> {
        if self.length != self.chain.len() as u64 {
            return Err(SyncError::MalformedResponse {
                peer: peer.clone(),
                reason: format!(
                    "advertised length {} but sent {} blocks",
                    self.length,
                    self.chain.len()
                ),
            });
        }
        Ok(self.chain)
    }
}

/// A remote node.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Peer: Send + Sync {
    /// The peer's identity.
    fn id(&self) -> &PeerId;

    /// Fetch the peer's full chain.
    async fn fetch_chain(&self) -> Result<ChainResponse>;

    /// Announce a newly mined block to the peer.
    async fn send_block(&self, block: &Block) -> Result<BlockReception>;
}

/// Registry of known peers, keyed by id.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<BTreeMap<PeerId, Arc<dyn Peer>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer`, replacing any previous peer with the same id.
    ///
    /// Returns `true` if the id was new.
    pub async fn register(&self, peer: Arc<dyn Peer>) -> bool {
        let id = peer.id().clone();
        self.peers.write().await.insert(id, peer).is_none()
    }

    /// Forget a peer. Returns `true` if it was registered.
    pub async fn remove(&self, id: &PeerId) -> bool {
        self.peers.write().await.remove(id).is_some()
    }

    /// Snapshot of all peers, ordered by id.
    pub async fn list(&self) -> Vec<Arc<dyn Peer>> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<PeerId> {
        self.peers.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
