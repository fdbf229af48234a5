//! Error types for the sync module.

use thiserror::Error;

use crate::peer::PeerId;

/// Errors that can occur while talking to peers.
///
/// None of these is fatal: the offending peer is skipped and resolution
/// carries on with the rest.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The peer could not be reached.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: PeerId, reason: String },

    /// The peer answered with something that is not a chain.
    #[error("malformed response from {peer}: {reason}")]
    MalformedResponse { peer: PeerId, reason: String },

    /// The peer was reached but failed while handling the request.
    #[error("peer {peer} failed: {reason}")]
    Remote { peer: PeerId, reason: String },

    /// The peer did not answer in time.
    #[error("timeout waiting for peer {0}")]
    Timeout(PeerId),

    /// A candidate chain failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] provenance_core::ValidationError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
