use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::transaction::DEFAULT_BUFFER_CAPACITY;
use crate::primitives::wal::WalSyncMode;
use crate::types::{PenumbraError, Result};

/// Settings for [`GraphDb::open`](crate::db::GraphDb::open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File-backed log location; `None` keeps the log in memory.
    pub wal_path: Option<PathBuf>,
    /// fsync policy for log appends.
    pub wal_sync: WalSyncMode,
    /// Initial capacity of a transaction's staging buffer, in bytes.
    pub buffer_capacity: usize,
    /// TOML schema file.
    pub schema_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_path: None,
            wal_sync: WalSyncMode::Full,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            schema_path: None,
        }
    }
}

impl Config {
    /// fsync on every commit.
    pub fn fully_durable() -> Self {
        Self {
            wal_sync: WalSyncMode::Full,
            ..Self::default()
        }
    }

    /// No fsync. Committed records can be lost on power failure.
    pub fn relaxed() -> Self {
        Self {
            wal_sync: WalSyncMode::Off,
            ..Self::default()
        }
    }

    /// Sets the log file location.
    pub fn with_wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self
    }

    /// Sets the schema file location.
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Sets the staging buffer capacity.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Parses a TOML document.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).map_err(|err| PenumbraError::InvalidOwned(format!("config: {err}")))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }
}
