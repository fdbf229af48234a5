//! Transactions: open registration records with a few well-known fields.
//!
//! A transaction is a JSON object. The keys the ledger understands are held
//! in typed fields; everything else is carried opaquely in an extension map
//! and survives every round-trip untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::canonical::canonical_value_bytes;
use crate::crypto::{verify_signature, KeyPair};
use crate::error::CoreError;
use crate::types::Digest;

/// Keys with typed storage on [`Transaction`].
pub mod keys {
    pub const SIGNATURE: &str = "signature";
    pub const PUBLIC_KEY: &str = "public_key";
    pub const IMAGE_HASH: &str = "image_hash";
    pub const SOURCE_HASH: &str = "source_hash";
    pub const CONDITION: &str = "condition";

    /// All well-known keys.
    pub const ALL: [&str; 5] = [SIGNATURE, PUBLIC_KEY, IMAGE_HASH, SOURCE_HASH, CONDITION];
}

/// A ledger transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Base64 RSA-PSS signature over the transaction without this field.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_string")]
    signature: Option<String>,

    /// PEM public key the signature verifies against.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_string")]
    public_key: Option<String>,

    /// Content digest of the registered payload.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_string")]
    image_hash: Option<String>,

    /// Content digest of the source the payload was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_string")]
    source_hash: Option<String>,

    /// Precondition expression evaluated against the transaction's fields.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_string")]
    condition: Option<String>,

    /// Every other key.
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

/// Well-known keys must hold strings when present; `null` is rejected rather
/// than silently dropped, since dropping it would change the canonical form.
fn present_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    String::deserialize(deserializer).map(Some)
}

impl Transaction {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transaction from a JSON object.
    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(CoreError::Decoding(format!(
                "transaction must be an object, got {}",
                other
            ))),
        }
    }

    /// Build a transaction from a JSON map.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, CoreError> {
        let mut tx = Self::new();
        for (key, value) in map {
            tx.insert(key, value)?;
        }
        Ok(tx)
    }

    /// Insert a field, routing well-known keys to their typed slots.
    ///
    /// Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<Option<Value>, CoreError> {
        let key = key.into();
        let Some(slot) = self.slot_mut(&key) else {
            return Ok(self.fields.insert(key, value));
        };
        match value {
            Value::String(s) => Ok(slot.replace(s).map(Value::String)),
            _ => Err(CoreError::InvalidField { key }),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, CoreError> {
        self.insert(key, value.into())?;
        Ok(self)
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match self.slot_mut(key) {
            Some(slot) => slot.take().map(Value::String),
            None => self.fields.remove(key),
        }
    }

    /// Get a field by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            keys::SIGNATURE => self.signature.clone().map(Value::String),
            keys::PUBLIC_KEY => self.public_key.clone().map(Value::String),
            keys::IMAGE_HASH => self.image_hash.clone().map(Value::String),
            keys::SOURCE_HASH => self.source_hash.clone().map(Value::String),
            keys::CONDITION => self.condition.clone().map(Value::String),
            _ => self.fields.get(key).cloned(),
        }
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            keys::SIGNATURE => Some(&mut self.signature),
            keys::PUBLIC_KEY => Some(&mut self.public_key),
            keys::IMAGE_HASH => Some(&mut self.image_hash),
            keys::SOURCE_HASH => Some(&mut self.source_hash),
            keys::CONDITION => Some(&mut self.condition),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    pub fn image_hash(&self) -> Option<&str> {
        self.image_hash.as_deref()
    }

    pub fn source_hash(&self) -> Option<&str> {
        self.source_hash.as_deref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Extension fields the ledger does not interpret.
    pub fn extra_fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn set_public_key(&mut self, pem: impl Into<String>) {
        self.public_key = Some(pem.into());
    }

    pub fn set_image_hash(&mut self, digest: impl Into<String>) {
        self.image_hash = Some(digest.into());
    }

    pub fn set_source_hash(&mut self, digest: impl Into<String>) {
        self.source_hash = Some(digest.into());
    }

    pub fn set_condition(&mut self, script: impl Into<String>) {
        self.condition = Some(script.into());
    }

    /// Number of fields, well-known ones included.
    pub fn len(&self) -> usize {
        self.fields.len()
            + [
                &self.signature,
                &self.public_key,
                &self.image_hash,
                &self.source_hash,
                &self.condition,
            ]
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The full field map, well-known keys included.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for key in keys::ALL {
            if let Some(value) = self.get(key) {
                map.insert(key.to_string(), value);
            }
        }
        map
    }

    /// The transaction as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }

    /// Canonical bytes of the whole transaction.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_value_bytes(&self.to_json())
    }

    /// Merkle leaf hash: SHA-256 of the canonical bytes.
    pub fn leaf_hash(&self) -> Digest {
        Digest::hash(&self.canonical_bytes())
    }

    /// The bytes a signature covers: canonical form with `signature` removed.
    ///
    /// `public_key` stays in the payload, binding the key to the signature.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut map = self.to_map();
        map.remove(keys::SIGNATURE);
        canonical_value_bytes(&Value::Object(map))
    }

    /// Whether the transaction declares both a signature and a public key.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some() && self.public_key.is_some()
    }

    /// Attach `keypair`'s public key and sign the result.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), CoreError> {
        self.signature = None;
        self.public_key = Some(keypair.public_key().to_pem()?);
        let signature = keypair.sign(&self.signing_payload())?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Verify the embedded signature.
    ///
    /// Returns `Ok(false)` when the transaction is unsigned, `Ok(true)` when
    /// the signature verifies, and an error when it does not.
    pub fn verify_signature(&self) -> Result<bool, CoreError> {
        match (&self.signature, &self.public_key) {
            (Some(signature), Some(pem)) => {
                verify_signature(pem, &self.signing_payload(), signature)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether the transaction registers `digest` as its image or source hash.
    pub fn references(&self, digest: &str) -> bool {
        self.image_hash.as_deref() == Some(digest) || self.source_hash.as_deref() == Some(digest)
    }
}
