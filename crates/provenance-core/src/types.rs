//! Strong type definitions for the provenance ledger.
//!
//! Digests travel as lowercase hex strings on the wire and in storage, but are
//! held as raw bytes in memory so that malformed hashes are rejected at the
//! boundary instead of deep inside validation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Compute the SHA-256 digest of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character lowercase hex string.
    ///
    /// Uppercase hex is rejected: two spellings of the same digest would
    /// otherwise compare equal here but hash differently once re-serialized.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 64 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(CoreError::InvalidDigest(s.to_string()));
        }
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr).map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Number of leading `'0'` characters in the hex form.
    pub fn leading_zeros(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// Whether the hex form starts with at least `difficulty` zeros.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zeros() >= difficulty
    }

    /// Digest of the empty byte string, the Merkle root of no transactions.
    pub fn empty() -> Self {
        Self::hash(b"")
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The `previous_hash` of a block.
///
/// Genesis blocks point at the literal `"0"`; every other block points at the
/// digest of its predecessor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviousHash {
    /// The genesis sentinel, encoded as `"0"`.
    Genesis,
    /// Hash of the preceding block.
    Block(Digest),
}

impl PreviousHash {
    /// Wire form of the genesis sentinel.
    pub const GENESIS_SENTINEL: &'static str = "0";

    /// String form used in headers and storage.
    pub fn to_hex(&self) -> String {
        match self {
            Self::Genesis => Self::GENESIS_SENTINEL.to_string(),
            Self::Block(digest) => digest.to_hex(),
        }
    }

    /// Parse `"0"` or a block digest.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s == Self::GENESIS_SENTINEL {
            Ok(Self::Genesis)
        } else {
            Digest::from_hex(s).map(Self::Block)
        }
    }

    /// The digest this hash points at, if it is not the genesis sentinel.
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Genesis => None,
            Self::Block(digest) => Some(digest),
        }
    }

    /// Whether this is the genesis sentinel.
    pub fn is_genesis(&self) -> bool {
        matches!(self, Self::Genesis)
    }
}

impl fmt::Debug for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Genesis => f.write_str("PreviousHash(0)"),
            Self::Block(digest) => write!(f, "PreviousHash({})", &digest.to_hex()[..16]),
        }
    }
}

impl fmt::Display for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Digest> for PreviousHash {
    fn from(digest: Digest) -> Self {
        Self::Block(digest)
    }
}

impl PartialEq<Digest> for PreviousHash {
    fn eq(&self, other: &Digest) -> bool {
        matches!(self, Self::Block(d) if d == other)
    }
}

impl Serialize for PreviousHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PreviousHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
