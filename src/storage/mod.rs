//! Schema catalog and graph storage consulted by the write path.

/// Data catalog and schema information.
///
/// Label names and declared property types, loadable from TOML.
pub mod catalog;

/// Graph storage contract and the in-memory store.
pub mod graph;

pub use catalog::{EdgeLabelDef, PropertyDef, Schema, SchemaDef, SchemaRegistry, VertexLabelDef};
pub use graph::{EdgeRecord, EdgeSpec, GraphStore, MemGraph};
