//! The node service: a shared [`Blockchain`] plus its peers.
//!
//! The node wraps the state machine in a tokio `RwLock` with a single-writer
//! discipline. Proof-of-work runs on the blocking pool without the lock; the
//! sealed block is committed under the write lock and refused if the chain
//! moved in the meantime.
//!
//! A node built with [`Node::from_config`] holds an RSA identity key and signs
//! every registration it makes.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use provenance_core::{content_digest, Block, BlockReception, KeyPair, Transaction};
use provenance_store::StorageBackend;
use provenance_sync::{
    ChainResponse, ConflictResolver, MemoryNetwork, Peer, PeerHandler, PeerId, PeerSet, SyncConfig,
    SyncError,
};

use crate::blockchain::{now_secs, Blockchain};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};

/// A ledger node.
pub struct Node<S: StorageBackend> {
    id: PeerId,
    chain: Arc<RwLock<Blockchain<S>>>,
    peers: PeerSet,
    resolver: ConflictResolver,
    keypair: Option<KeyPair>,
    /// Peers registered when the node joins a network.
    bootstrap: Vec<PeerId>,
}

impl<S: StorageBackend + 'static> Node<S> {
    /// A node without an identity key or bootstrap peers.
    pub fn new(id: impl Into<PeerId>, blockchain: Blockchain<S>, sync: SyncConfig) -> Self {
        Self {
            id: id.into(),
            chain: Arc::new(RwLock::new(blockchain)),
            peers: PeerSet::new(),
            resolver: ConflictResolver::new(sync),
            keypair: None,
            bootstrap: Vec::new(),
        }
    }

    /// A node named and wired by `config`, with a freshly generated identity
    /// key of `config.key_size` bits.
    pub fn from_config(config: &LedgerConfig, blockchain: Blockchain<S>) -> Result<Self> {
        config.validate()?;
        let keypair = config.generate_keypair()?;
        let mut node = Self::new(config.node_id.clone(), blockchain, config.sync.clone())
            .with_keypair(keypair);
        node.bootstrap = config
            .peers
            .iter()
            .filter(|peer| **peer != config.node_id)
            .map(|peer| PeerId::new(peer.as_str()))
            .collect();
        info!(
            node = %node.id,
            key_bits = config.key_size,
            peers = node.bootstrap.len(),
            "node configured"
        );
        Ok(node)
    }

    /// Sign registrations with `keypair`.
    pub fn with_keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// The identity key, if the node has one.
    pub fn keypair(&self) -> Option<&KeyPair> {
        self.keypair.as_ref()
    }

    /// The shared state machine.
    pub fn blockchain(&self) -> &Arc<RwLock<Blockchain<S>>> {
        &self.chain
    }

    /// Snapshot of the chain.
    pub async fn chain(&self) -> Vec<Block> {
        self.chain.read().await.chain().to_vec()
    }

    pub async fn len(&self) -> usize {
        self.chain.read().await.len()
    }

    /// Snapshot of the mempool.
    pub async fn mempool(&self) -> Vec<Transaction> {
        self.chain.read().await.mempool().to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peers
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a peer. Returns `true` if its id was new.
    pub async fn register_peer(&self, peer: Arc<dyn Peer>) -> bool {
        let added = self.peers.register(peer).await;
        if added {
            debug!(node = %self.id, "registered peer");
        }
        added
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Make this node reachable on `network` under its own id, and register
    /// its bootstrap peers through the same network.
    pub async fn join(self: &Arc<Self>, network: &Arc<MemoryNetwork>) {
        let handler: Weak<dyn PeerHandler> = Arc::downgrade(self) as Weak<dyn PeerHandler>;
        network.join(self.id.clone(), handler).await;
        for id in &self.bootstrap {
            self.register_peer(Arc::new(network.peer(id.clone()))).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions and Mining
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit a transaction to the mempool.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        self.chain.write().await.admit_transaction(tx)?;
        Ok(())
    }

    /// Mine the mempool into a block and announce it to every peer.
    ///
    /// Returns the new block's index, or `None` when there was nothing to
    /// mine.
    pub async fn mine(&self) -> Result<Option<u64>> {
        let (job, pow) = {
            let chain = self.chain.write().await;
            match chain.prepare_mining() {
                Some(job) => (job, chain.pow()),
                None => return Ok(None),
            }
        };

        let sealed = tokio::task::spawn_blocking(move || job.run(&pow))
            .await
            .map_err(|e| LedgerError::Mining(e.to_string()))??;

        let index = self.chain.write().await.commit_mined(sealed.clone())?;
        self.broadcast(&sealed).await;
        Ok(Some(index))
    }

    async fn broadcast(&self, block: &Block) {
        let timeout = self.resolver.config().peer_timeout;
        for peer in self.peers.list().await {
            match tokio::time::timeout(timeout, peer.send_block(block)).await {
                Ok(Ok(reception)) => {
                    debug!(peer = %peer.id(), index = block.index, ?reception, "announced block");
                }
                Ok(Err(e)) => warn!(peer = %peer.id(), error = %e, "block announcement failed"),
                Err(_) => warn!(peer = %peer.id(), "block announcement timed out"),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consensus
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle a block announced by a peer, resyncing when it belongs to a
    /// chain this node has not seen.
    pub async fn receive_block(&self, block: Block) -> Result<BlockReception> {
        let reception = self.chain.write().await.receive_block(block)?;
        if reception == BlockReception::NeedsResync {
            self.resolve_conflicts().await?;
        }
        Ok(reception)
    }

    /// Adopt the longest valid chain among peers, if it beats ours.
    ///
    /// Peers are contacted without holding the lock; `replace_chain` checks
    /// the winner again against whatever the chain is by then.
    pub async fn resolve_conflicts(&self) -> Result<bool> {
        let (local_len, difficulty) = {
            let chain = self.chain.read().await;
            (chain.len(), chain.difficulty())
        };

        let peers = self.peers.list().await;
        let (winner, report) = self.resolver.resolve(local_len, &peers, difficulty).await;
        debug!(node = %self.id, ?report, "conflict resolution finished");

        let Some(winner) = winner else {
            return Ok(false);
        };
        let replaced = self.chain.write().await.replace_chain(winner.chain)?;
        if replaced {
            info!(node = %self.id, peer = %winner.peer, "adopted peer chain");
        }
        Ok(replaced)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Content Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `content` on the chain and mine it.
    ///
    /// The transaction carries `metadata` plus `node_id`, `image_hash` and
    /// `timestamp`, which take precedence over metadata keys of the same
    /// name. A node with an identity key signs it. Returns the content digest.
    pub async fn register_content(&self, content: &[u8], metadata: Map<String, Value>) -> Result<String> {
        let digest = content_digest(content).to_hex();

        let mut tx = Transaction::from_map(metadata)?;
        tx.insert("node_id", Value::String(self.id.to_string()))?;
        tx.set_image_hash(digest.clone());
        tx.insert("timestamp", Value::from(now_secs()))?;
        if let Some(keypair) = &self.keypair {
            tx.sign(keypair)?;
        }

        {
            let mut chain = self.chain.write().await;
            if chain.find_pending(&digest).is_some() || chain.find_transaction(&digest)?.is_some() {
                return Err(LedgerError::DuplicateRegistration(digest));
            }
            chain.admit_transaction(tx)?;
        }
        info!(node = %self.id, %digest, "registered content");

        self.mine().await?;
        Ok(digest)
    }

    /// The committed transaction registering `content`, if any.
    pub async fn verify_content(&self, content: &[u8]) -> Result<Option<Transaction>> {
        let digest = content_digest(content).to_hex();
        self.chain.read().await.find_transaction(&digest)
    }
}

#[async_trait]
impl<S: StorageBackend + 'static> PeerHandler for Node<S> {
    async fn handle_chain_request(&self) -> ChainResponse {
        ChainResponse::new(self.chain().await)
    }

    async fn handle_block(&self, block: Block) -> provenance_sync::Result<BlockReception> {
        self.receive_block(block).await.map_err(|e| SyncError::Remote {
            peer: self.id.clone(),
            reason: e.to_string(),
        })
    }
}
