//! In-process peers for testing.
//!
//! Nodes join a [`MemoryNetwork`] with a [`PeerHandler`] and reach each other
//! through [`MemoryPeer`] handles. The network holds handlers weakly, so a
//! node that is dropped simply becomes unreachable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::RwLock;

use provenance_core::{Block, BlockReception};

use crate::error::{Result, SyncError};
use crate::peer::{ChainResponse, Peer, PeerId};

/// The receiving side of a node.
#[async_trait]
pub trait PeerHandler: Send + Sync {
    /// Answer a chain request.
    async fn handle_chain_request(&self) -> ChainResponse;

    /// Handle a block announced by a peer.
    ///
    /// Errors are failures on the receiving node (storage, resync), not
    /// verdicts on the block.
    async fn handle_block(&self, block: Block) -> Result<BlockReception>;
}

/// Shared state for the in-memory network.
#[derive(Default)]
pub struct MemoryNetwork {
    handlers: RwLock<HashMap<PeerId, Weak<dyn PeerHandler>>>,
    offline: RwLock<HashSet<PeerId>>,
}

impl MemoryNetwork {
    /// Create a new memory network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach `handler` under `id`, replacing any previous handler.
    pub async fn join(&self, id: PeerId, handler: Weak<dyn PeerHandler>) {
        self.handlers.write().await.insert(id, handler);
    }

    /// Detach `id`.
    pub async fn leave(&self, id: &PeerId) {
        self.handlers.write().await.remove(id);
    }

    /// Mark `id` as unreachable (or reachable again).
    pub async fn set_offline(&self, id: &PeerId, offline: bool) {
        let mut set = self.offline.write().await;
        if offline {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }

    /// A handle for reaching `id` through this network.
    pub fn peer(self: &Arc<Self>, id: impl Into<PeerId>) -> MemoryPeer {
        MemoryPeer {
            id: id.into(),
            network: Arc::clone(self),
        }
    }

    async fn handler(&self, id: &PeerId) -> Result<Arc<dyn PeerHandler>> {
        let unreachable = |reason: &str| SyncError::PeerUnreachable {
            peer: id.clone(),
            reason: reason.to_string(),
        };

        if self.offline.read().await.contains(id) {
            return Err(unreachable("offline"));
        }
        let handlers = self.handlers.read().await;
        let weak = handlers.get(id).ok_or_else(|| unreachable("not on network"))?;
        weak.upgrade().ok_or_else(|| unreachable("node dropped"))
    }
}

/// A peer reached through a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryPeer {
    id: PeerId,
    network: Arc<MemoryNetwork>,
}

#[async_trait]
impl Peer for MemoryPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    async fn fetch_chain(&self) -> Result<ChainResponse> {
        let handler = self.network.handler(&self.id).await?;
        Ok(handler.handle_chain_request().await)
    }

    async fn send_block(&self, block: &Block) -> Result<BlockReception> {
        let handler = self.network.handler(&self.id).await?;
        handler.handle_block(block.clone()).await
    }
}
