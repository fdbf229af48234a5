//! Ledger configuration.
//!
//! Every field has a default, and [`LedgerConfig::from_env`] overrides them
//! from `TP_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use provenance_conditions::Evaluator;
use provenance_core::{KeyPair, PowStrategy, DEFAULT_KEY_BITS, MAX_DIFFICULTY};
use provenance_store::{MemoryBackend, SqliteBackend, StorageBackend};
use provenance_sync::SyncConfig;

use crate::error::{LedgerError, Result};

/// Smallest RSA modulus accepted for node keys.
pub const MIN_KEY_BITS: usize = 1024;

/// Which storage backend a ledger persists to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageKind {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Configuration for a ledger node.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Identity stamped into registrations and used on the peer network.
    pub node_id: String,
    /// Leading hex zeros required of every block hash.
    pub difficulty: u32,
    pub storage_backend: StorageKind,
    pub storage_dir: PathBuf,
    pub db_filename: String,
    /// Nonce search strategy.
    pub pow: PowStrategy,
    /// Condition evaluation strategy.
    pub evaluator: Evaluator,
    /// Reject unsigned transactions.
    pub require_signatures: bool,
    /// RSA modulus size for generated node keys.
    pub key_size: usize,
    /// Peer identifiers to connect to on startup.
    pub peers: Vec<String>,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_id: "default_node".to_string(),
            difficulty: 4,
            storage_backend: StorageKind::Sqlite,
            storage_dir: PathBuf::from("node_storage"),
            db_filename: "blockchain.db".to_string(),
            pow: PowStrategy::default(),
            evaluator: Evaluator::default(),
            require_signatures: false,
            key_size: DEFAULT_KEY_BITS,
            peers: Vec::new(),
            sync: SyncConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `TP_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("TP_NODE_ID") {
            config.node_id = v;
        }
        if let Some(v) = lookup("TP_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TP_STORAGE_BACKEND") {
            config.storage_backend = parse_var("TP_STORAGE_BACKEND", &v)?;
        }
        if let Some(v) = lookup("TP_DB_FILENAME") {
            config.db_filename = v;
        }
        if let Some(v) = lookup("TP_KEY_SIZE") {
            config.key_size = parse_var("TP_KEY_SIZE", &v)?;
        }
        if let Some(v) = lookup("TP_DIFFICULTY") {
            config.difficulty = parse_var("TP_DIFFICULTY", &v)?;
        }
        if let Some(v) = lookup("TP_POW") {
            config.pow = parse_var("TP_POW", &v)?;
        }
        if let Some(v) = lookup("TP_CONDITION_EVALUATOR") {
            config.evaluator = parse_var("TP_CONDITION_EVALUATOR", &v)?;
        }
        if let Some(v) = lookup("TP_REQUIRE_SIGNATURES") {
            config.require_signatures = parse_flag("TP_REQUIRE_SIGNATURES", &v)?;
        }
        if let Some(v) = lookup("TP_PEERS") {
            config.peers = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("TP_PEER_TIMEOUT_SECS") {
            let secs: u64 = parse_var("TP_PEER_TIMEOUT_SECS", &v)?;
            config.sync.peer_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(LedgerError::InvalidConfig("node id must not be empty".into()));
        }
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidConfig(format!(
                "difficulty {} exceeds maximum of {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        if self.key_size < MIN_KEY_BITS {
            return Err(LedgerError::InvalidConfig(format!(
                "key size {} is below minimum of {}",
                self.key_size, MIN_KEY_BITS
            )));
        }
        if self.storage_backend == StorageKind::Sqlite && self.db_filename.trim().is_empty() {
            return Err(LedgerError::InvalidConfig("database filename must not be empty".into()));
        }
        if self.sync.peer_timeout.is_zero() {
            return Err(LedgerError::InvalidConfig("peer timeout must be positive".into()));
        }
        Ok(())
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.db_filename)
    }

    /// Open the configured storage backend.
    pub fn open_storage(&self) -> Result<Box<dyn StorageBackend>> {
        Ok(match self.storage_backend {
            StorageKind::Sqlite => Box::new(SqliteBackend::open(self.db_path())?),
            StorageKind::Memory => Box::new(MemoryBackend::new()),
        })
    }

    /// Generate a fresh node key pair of the configured size.
    pub fn generate_keypair(&self) -> Result<KeyPair> {
        Ok(KeyPair::generate(self.key_size)?)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LedgerError::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(LedgerError::InvalidConfig(format!(
            "{}={:?}: expected a boolean",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.node_id, "default_node");
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.storage_backend, StorageKind::Sqlite);
        assert_eq!(config.db_path(), PathBuf::from("node_storage").join("blockchain.db"));
        assert_eq!(config.key_size, 2048);
        assert!(!config.require_signatures);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("TP_NODE_ID", "node-7"),
            ("TP_STORAGE_BACKEND", "Memory"),
            ("TP_DIFFICULTY", "2"),
            ("TP_POW", "scalar"),
            ("TP_CONDITION_EVALUATOR", "reference"),
            ("TP_REQUIRE_SIGNATURES", "true"),
            ("TP_PEERS", "a, b,,c"),
            ("TP_PEER_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.node_id, "node-7");
        assert_eq!(config.storage_backend, StorageKind::Memory);
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.pow, PowStrategy::Scalar);
        assert_eq!(config.evaluator, Evaluator::Reference);
        assert!(config.require_signatures);
        assert_eq!(config.peers, vec!["a", "b", "c"]);
        assert_eq!(config.sync.peer_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for vars in [
            [("TP_STORAGE_BACKEND", "postgres")],
            [("TP_DIFFICULTY", "65")],
            [("TP_DIFFICULTY", "four")],
            [("TP_KEY_SIZE", "512")],
            [("TP_REQUIRE_SIGNATURES", "maybe")],
            [("TP_NODE_ID", "  ")],
        ] {
            assert!(
                matches!(
                    LedgerConfig::from_lookup(lookup(&vars)),
                    Err(LedgerError::InvalidConfig(_))
                ),
                "{:?} should be rejected",
                vars
            );
        }
    }

    #[test]
    fn test_open_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            storage_dir: dir.path().join("nested"),
            ..LedgerConfig::default()
        };
        let store = config.open_storage().unwrap();
        assert_eq!(store.block_count().unwrap(), 0);
        assert!(config.db_path().exists());

        let memory = LedgerConfig {
            storage_backend: StorageKind::Memory,
            ..LedgerConfig::default()
        };
        assert_eq!(memory.open_storage().unwrap().load_chain().unwrap(), Vec::new());
    }
}
