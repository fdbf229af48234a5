//! Proof-of-work search.
//!
//! The search is a deterministic scan: the winning nonce is the *smallest*
//! non-negative integer whose header hash has at least `difficulty` leading
//! hex zeros. Validators re-derive nothing but the hash, yet every strategy
//! must agree on the nonce so that two honest miners given the same template
//! produce the same block.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::block::BlockHeader;
use crate::error::CoreError;
use crate::types::Digest;

/// Largest meaningful difficulty: every hex character of the digest is zero.
pub const MAX_DIFFICULTY: u32 = 64;

/// A proof-of-work search strategy.
pub trait ProofOfWork: Send + Sync {
    /// Find the smallest nonce whose header hash meets `difficulty`.
    ///
    /// The `nonce` field of `template` is ignored.
    fn find_proof(&self, template: &BlockHeader, difficulty: u32) -> Result<(u64, Digest), CoreError>;
}

fn check_difficulty(difficulty: u32) -> Result<(), CoreError> {
    if difficulty > MAX_DIFFICULTY {
        return Err(CoreError::DifficultyTooHigh(difficulty));
    }
    Ok(())
}

/// Reference search: re-encode and hash the full header for every nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarPow;

impl ProofOfWork for ScalarPow {
    fn find_proof(&self, template: &BlockHeader, difficulty: u32) -> Result<(u64, Digest), CoreError> {
        check_difficulty(difficulty)?;
        for nonce in 0..=u64::MAX {
            let hash = template.with_nonce(nonce).hash();
            if hash.meets_difficulty(difficulty) {
                return Ok((nonce, hash));
            }
        }
        Err(CoreError::NonceSpaceExhausted(difficulty))
    }
}

/// Accelerated search.
///
/// The header is encoded once and split around the nonce. The SHA-256 state
/// after absorbing the prefix is computed once and cloned per candidate.
/// Nonces are scanned in fixed windows; within a window candidates are hashed
/// in parallel and `find_first` keeps the lowest match, so the result is the
/// same nonce the scalar loop finds.
#[derive(Debug, Clone, Copy)]
pub struct ParallelPow {
    window: u64,
}

impl ParallelPow {
    /// Default number of nonces per window.
    pub const DEFAULT_WINDOW: u64 = 1 << 14;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    /// Use a custom window size (clamped to at least one nonce).
    pub fn with_window(window: u64) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl Default for ParallelPow {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofOfWork for ParallelPow {
    fn find_proof(&self, template: &BlockHeader, difficulty: u32) -> Result<(u64, Digest), CoreError> {
        check_difficulty(difficulty)?;

        let (prefix, suffix) = template.split_at_nonce();
        let mut midstate = Sha256::new();
        midstate.update(prefix.as_bytes());
        let suffix = suffix.as_bytes();

        let hash_at = |nonce: u64| -> Digest {
            let mut hasher = midstate.clone();
            hasher.update(nonce.to_string().as_bytes());
            hasher.update(suffix);
            Digest(hasher.finalize().into())
        };

        let mut start = 0u64;
        loop {
            let end = start.saturating_add(self.window - 1);
            let found = (start..=end)
                .into_par_iter()
                .map(|nonce| (nonce, hash_at(nonce)))
                .find_first(|(_, hash)| hash.meets_difficulty(difficulty));

            if let Some(proof) = found {
                return Ok(proof);
            }
            if end == u64::MAX {
                return Err(CoreError::NonceSpaceExhausted(difficulty));
            }
            start = end + 1;
        }
    }
}

/// Strategy selector, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowStrategy {
    /// [`ScalarPow`].
    Scalar,
    /// [`ParallelPow`] with its default window.
    #[default]
    Parallel,
}

impl ProofOfWork for PowStrategy {
    fn find_proof(&self, template: &BlockHeader, difficulty: u32) -> Result<(u64, Digest), CoreError> {
        match self {
            Self::Scalar => ScalarPow.find_proof(template, difficulty),
            Self::Parallel => ParallelPow::new().find_proof(template, difficulty),
        }
    }
}

impl FromStr for PowStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" => Ok(Self::Scalar),
            "parallel" => Ok(Self::Parallel),
            other => Err(format!("unknown proof-of-work strategy: {}", other)),
        }
    }
}

impl fmt::Display for PowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("scalar"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}
