//! Longest-valid-chain conflict resolution.
//!
//! The local node asks every peer for its chain and adopts the longest one
//! that is strictly longer than its own and fully valid. Peers that fail to
//! answer, answer with garbage, or offer an invalid chain are skipped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use provenance_core::{validate_chain, Block};

use crate::error::{Result, SyncError};
use crate::peer::{Peer, PeerId};

/// Configuration for talking to peers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long to wait for a single peer's chain or block acknowledgement.
    pub peer_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_secs(30),
        }
    }
}

/// A chain offered by a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub peer: PeerId,
    pub chain: Vec<Block>,
}

/// What happened during one round of conflict resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Peers asked for their chain.
    pub contacted: usize,
    /// Peers that could not be reached or timed out.
    pub unreachable: usize,
    /// Peers whose response was malformed.
    pub malformed: usize,
    /// Candidates that failed validation.
    pub invalid: usize,
    /// Candidates no longer than the best seen so far.
    pub not_longer: usize,
    /// Peer whose chain was selected, if any.
    pub selected: Option<PeerId>,
}

/// Fetches and ranks candidate chains.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    config: SyncConfig,
}

impl ConflictResolver {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn fetch(&self, peer: &dyn Peer) -> Result<Vec<Block>> {
        let response = tokio::time::timeout(self.config.peer_timeout, peer.fetch_chain())
            .await
            .map_err(|_| SyncError::Timeout(peer.id().clone()))??;
        response.into_chain(peer.id())
    }

    /// Fetch every peer's chain. Failing peers are logged and counted, never
    /// fatal.
    pub async fn collect_candidates(
        &self,
        peers: &[Arc<dyn Peer>],
        report: &mut ResolutionReport,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(peers.len());

        for peer in peers {
            report.contacted += 1;
            match self.fetch(peer.as_ref()).await {
                Ok(chain) => {
                    debug!(peer = %peer.id(), len = chain.len(), "fetched candidate chain");
                    candidates.push(Candidate {
                        peer: peer.id().clone(),
                        chain,
                    });
                }
                Err(e @ SyncError::MalformedResponse { .. }) => {
                    warn!(error = %e, "skipping peer");
                    report.malformed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "skipping peer");
                    report.unreachable += 1;
                }
            }
        }

        candidates
    }

    /// Fetch candidates from `peers` and pick the winner.
    pub async fn resolve(
        &self,
        local_len: usize,
        peers: &[Arc<dyn Peer>],
        difficulty: u32,
    ) -> (Option<Candidate>, ResolutionReport) {
        let mut report = ResolutionReport::default();
        let candidates = self.collect_candidates(peers, &mut report).await;
        let winner = select_longest_valid(local_len, candidates, difficulty, &mut report);
        if let Some(winner) = &winner {
            info!(peer = %winner.peer, len = winner.chain.len(), "found longer valid chain");
        }
        (winner, report)
    }
}

/// Pick the longest candidate that is strictly longer than `local_len` and
/// valid at `difficulty`.
///
/// Among equally long candidates the first one wins. Candidates are only
/// validated once they would beat the current best.
pub fn select_longest_valid(
    local_len: usize,
    candidates: Vec<Candidate>,
    difficulty: u32,
    report: &mut ResolutionReport,
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    let mut best_len = local_len;

    for candidate in candidates {
        if candidate.chain.len() <= best_len {
            report.not_longer += 1;
            continue;
        }
        if let Err(e) = validate_chain(&candidate.chain, difficulty) {
            warn!(peer = %candidate.peer, error = %e, "rejecting invalid candidate chain");
            report.invalid += 1;
            continue;
        }
        best_len = candidate.chain.len();
        best = Some(candidate);
    }

    report.selected = best.as_ref().map(|c| c.peer.clone());
    best
}
