//! Penumbra: the single-vertex write path of a labeled property graph.
//!
//! A [`SingleVertexInsertTransaction`] stages at most one vertex insert and
//! any number of edge inserts into one binary log record. Edges may point at
//! the staged vertex before it has a position; those endpoints are filled in
//! when the committed record is applied to the graph.

#![warn(missing_docs)]

pub mod db;
pub mod logging;
pub mod primitives;
pub mod storage;
pub mod types;

pub use db::{Config, GraphDb, SingleVertexInsertTransaction, TimestampAuthority, VersionManager};
pub use logging::init_logging;
pub use primitives::wal::{DurableLog, FileWal, MemoryWal, WalOptions, WalSyncMode};
pub use storage::{GraphStore, MemGraph, Schema, SchemaRegistry};
pub use types::{
    Any, LabelId, PenumbraError, PropertyType, Result, Timestamp, VertexId, TIMESTAMP_FINISHED,
};
