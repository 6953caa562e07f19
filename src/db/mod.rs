//! The single-vertex write transaction and everything it commits through.

mod config;
mod graph_db;
mod transaction;
mod version;

/// Replay of insert records into a graph store.
pub mod ingest;
/// Binary layout of insert records.
pub mod record;
/// Startup replay of the durable log.
pub mod recovery;


pub use config::Config;
pub use graph_db::GraphDb;
pub use ingest::{EndpointSource, IngestStats};
pub use record::{DecodedRecord, RecordType, WalHeader, WalOp, WAL_HEADER_LEN};
pub use recovery::RecoveryStats;
pub use transaction::{SingleVertexInsertTransaction, DEFAULT_BUFFER_CAPACITY};
pub use version::{TimestampAuthority, VersionManager};
