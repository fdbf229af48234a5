//! Block and chain validation.
//!
//! A block is accepted only if its header hash, its Merkle root and its
//! proof-of-work are all re-derived and match. Nothing stored on the block
//! is trusted.

use crate::block::Block;
use crate::error::ValidationError;

/// Check the self-contained parts of a block: header hash, Merkle root and
/// proof-of-work.
fn validate_contents(block: &Block, difficulty: u32) -> Result<(), ValidationError> {
    if block.hash != block.recompute_hash() {
        return Err(ValidationError::HashMismatch { index: block.index });
    }

    if block.merkle_root != block.compute_merkle_root() {
        return Err(ValidationError::MerkleRootMismatch { index: block.index });
    }

    let actual = block.hash.leading_zeros();
    if actual < difficulty {
        return Err(ValidationError::InsufficientWork {
            index: block.index,
            required: difficulty,
            actual,
        });
    }

    Ok(())
}

/// Validate a genesis block.
pub fn validate_genesis(block: &Block, difficulty: u32) -> Result<(), ValidationError> {
    if block.index != 0 {
        return Err(ValidationError::InvalidGenesis(format!(
            "index is {}, expected 0",
            block.index
        )));
    }
    if !block.previous_hash.is_genesis() {
        return Err(ValidationError::InvalidGenesis(
            "previous_hash is not \"0\"".into(),
        ));
    }
    validate_contents(block, difficulty)
}

/// Validate `block` as the successor of `previous`.
///
/// This performs:
/// - Linkage: `previous_hash` equals the predecessor's hash
/// - Index: exactly one past the predecessor
/// - Header hash recomputation
/// - Merkle root re-derivation from the transaction body
/// - Difficulty
pub fn validate_block(block: &Block, previous: &Block, difficulty: u32) -> Result<(), ValidationError> {
    if block.previous_hash != previous.hash {
        return Err(ValidationError::BrokenLink { index: block.index });
    }

    let expected = previous.index + 1;
    if block.index != expected {
        return Err(ValidationError::IndexMismatch {
            expected,
            got: block.index,
        });
    }

    validate_contents(block, difficulty)
}

/// Validate a whole chain from genesis.
pub fn validate_chain(chain: &[Block], difficulty: u32) -> Result<(), ValidationError> {
    let genesis = chain.first().ok_or(ValidationError::EmptyChain)?;
    validate_genesis(genesis, difficulty)?;

    for pair in chain.windows(2) {
        validate_block(&pair[1], &pair[0], difficulty)?;
    }

    Ok(())
}

/// How a node should treat a block announced by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReception {
    /// The block extends the local tip and validates; it was appended.
    Accepted,
    /// The block belongs to a chain the local node has not seen: either it
    /// is further ahead than the next index, or it is the next index but
    /// links to a different predecessor. Full conflict resolution is needed.
    NeedsResync,
    /// The block is stale or invalid.
    Rejected(ValidationError),
}

impl BlockReception {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Decide what to do with `block` given the local `tip`.
///
/// Returns [`BlockReception::Accepted`] only when `block` is a valid
/// successor of `tip`; the caller is responsible for appending it.
pub fn classify_block(block: &Block, tip: &Block, difficulty: u32) -> BlockReception {
    let next = tip.index + 1;
    if block.index > next || (block.index == next && block.previous_hash != tip.hash) {
        return BlockReception::NeedsResync;
    }
    if block.index < next {
        return BlockReception::Rejected(ValidationError::IndexMismatch {
            expected: next,
            got: block.index,
        });
    }
    match validate_block(block, tip, difficulty) {
        Ok(()) => BlockReception::Accepted,
        Err(e) => BlockReception::Rejected(e),
    }
}

/// Boolean form of [`validate_block`].
pub fn is_valid_block(block: &Block, previous: &Block, difficulty: u32) -> bool {
    validate_block(block, previous, difficulty).is_ok()
}

/// Boolean form of [`validate_chain`].
pub fn is_valid_chain(chain: &[Block], difficulty: u32) -> bool {
    validate_chain(chain, difficulty).is_ok()
}
