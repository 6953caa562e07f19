use std::sync::Arc;

use tracing::info;

use super::config::Config;
use super::recovery::{replay_log, RecoveryStats};
use super::transaction::SingleVertexInsertTransaction;
use super::version::VersionManager;
use crate::primitives::wal::{DurableLog, FileWal, MemoryWal, WalOptions};
use crate::storage::catalog::{Schema, SchemaRegistry};
use crate::storage::graph::MemGraph;
use crate::types::{PenumbraError, Result};

/// An in-memory graph with a durable insert log in front of it.
///
/// Owns the schema, the graph, the log and the timestamp issuer, and hands
/// out transactions that borrow them.
pub struct GraphDb {
    config: Config,
    schema: Arc<Schema>,
    graph: MemGraph,
    log: Box<dyn DurableLog>,
    versions: VersionManager,
    recovery: RecoveryStats,
}

impl GraphDb {
    /// Opens a database whose schema is read from `config.schema_path`.
    pub fn open(config: Config) -> Result<Self> {
        let path = config
            .schema_path
            .as_ref()
            .ok_or(PenumbraError::Invalid("schema_path not configured"))?;
        let schema = Schema::load(path)?;
        Self::open_with_schema(config, schema)
    }

    /// Opens a database over an explicit schema.
    ///
    /// With `wal_path` set, the log file is opened (or created) and every
    /// intact record in it is replayed before the first transaction starts.
    pub fn open_with_schema(config: Config, schema: Schema) -> Result<Self> {
        let schema = Arc::new(schema);
        let graph = MemGraph::new(Arc::clone(&schema) as Arc<dyn SchemaRegistry>);
        let (log, recovery): (Box<dyn DurableLog>, RecoveryStats) = match &config.wal_path {
            Some(path) => {
                let wal = FileWal::open_path(path, WalOptions::new(config.wal_sync))?;
                let stats = replay_log(&graph, &wal)?;
                (Box::new(wal), stats)
            }
            None => (Box::new(MemoryWal::new()), RecoveryStats::default()),
        };
        let versions = VersionManager::with_start(recovery.last_timestamp.saturating_add(1))?;
        info!(
            wal = ?config.wal_path,
            replayed = recovery.records,
            next_timestamp = versions.next_timestamp(),
            "db.open"
        );
        Ok(Self {
            config,
            schema,
            graph,
            log,
            versions,
            recovery,
        })
    }

    /// Builds a database around a caller-supplied log. Nothing is replayed.
    pub fn with_log(config: Config, schema: Schema, log: Box<dyn DurableLog>) -> Self {
        let schema = Arc::new(schema);
        let graph = MemGraph::new(Arc::clone(&schema) as Arc<dyn SchemaRegistry>);
        Self {
            config,
            schema,
            graph,
            log,
            versions: VersionManager::new(),
            recovery: RecoveryStats::default(),
        }
    }

    /// Acquires a timestamp and starts a single-vertex insert transaction.
    pub fn begin_single_vertex_insert(&self) -> Result<SingleVertexInsertTransaction<'_>> {
        let ts = self.versions.acquire_insert_timestamp()?;
        Ok(SingleVertexInsertTransaction::with_capacity(
            &self.graph,
            self.log.as_ref(),
            &self.versions,
            ts,
            self.config.buffer_capacity,
        ))
    }

    /// The live graph.
    pub fn graph(&self) -> &MemGraph {
        &self.graph
    }

    /// The schema the database was opened with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The timestamp issuer.
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// What the startup replay applied.
    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery
    }

    /// Settings the database was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
