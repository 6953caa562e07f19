#![forbid(unsafe_code)]
//! The graph-store contract the write path mutates through, and an in-memory
//! implementation of it.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::primitives::bytes::buf::Cursor;
use crate::storage::catalog::SchemaRegistry;
use crate::types::{Any, LabelId, OidKey, PenumbraError, Result, Timestamp, VertexId};

/// Resolved endpoints and label of an edge being ingested.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EdgeSpec {
    /// Source vertex label.
    pub src_label: LabelId,
    /// Source vertex position.
    pub src: VertexId,
    /// Destination vertex label.
    pub dst_label: LabelId,
    /// Destination vertex position.
    pub dst: VertexId,
    /// Edge label.
    pub label: LabelId,
}

/// Mutation and lookup primitives a transaction needs from the graph.
///
/// All methods take `&self`; implementations synchronise internally.
pub trait GraphStore: Send + Sync {
    /// Schema the store was built against.
    fn schema(&self) -> &dyn SchemaRegistry;

    /// Position of the vertex with external identifier `id`, if present.
    fn lookup(&self, label: LabelId, id: &Any) -> Option<VertexId>;

    /// Creates (or finds) the vertex with external identifier `id` and
    /// returns its position. Never returns [`VertexId::SELF_SENTINEL`].
    fn insert_vertex(&self, label: LabelId, id: &Any) -> Result<VertexId>;

    /// Reads exactly the label's declared property values from `reader` and
    /// stores them for `vid`.
    fn ingest_vertex_properties(
        &self,
        label: LabelId,
        vid: VertexId,
        reader: &mut Cursor<'_>,
    ) -> Result<()>;

    /// Reads exactly one tagged property value from `reader` and records the
    /// edge at timestamp `ts`.
    fn ingest_edge(&self, edge: EdgeSpec, ts: Timestamp, reader: &mut Cursor<'_>) -> Result<()>;
}

/// One stored edge.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRecord {
    /// Source position.
    pub src: VertexId,
    /// Destination position.
    pub dst: VertexId,
    /// Property value (`Any::Record` for multi-property edges).
    pub property: Any,
    /// Commit timestamp of the writing transaction.
    pub timestamp: Timestamp,
}

#[derive(Default)]
struct VertexTable {
    oids: Vec<Any>,
    index: FxHashMap<OidKey, VertexId>,
    columns: Vec<Vec<Any>>,
}

#[derive(Default)]
struct EdgeTable {
    records: Vec<EdgeRecord>,
    out: FxHashMap<VertexId, SmallVec<[usize; 4]>>,
}

#[derive(Default)]
struct GraphInner {
    tables: Vec<VertexTable>,
    edges: FxHashMap<(LabelId, LabelId, LabelId), EdgeTable>,
    edge_count: usize,
}

/// In-memory [`GraphStore`]: per-label vertex tables with an identifier
/// index and property columns, and per-triplet edge lists with out-adjacency.
pub struct MemGraph {
    schema: Arc<dyn SchemaRegistry>,
    inner: RwLock<GraphInner>,
}

impl MemGraph {
    /// Creates an empty graph over `schema`.
    pub fn new(schema: Arc<dyn SchemaRegistry>) -> Self {
        let tables = (0..schema.vertex_label_count())
            .map(|_| VertexTable::default())
            .collect();
        Self {
            schema,
            inner: RwLock::new(GraphInner {
                tables,
                ..GraphInner::default()
            }),
        }
    }

    /// Shared handle to the schema.
    pub fn schema_handle(&self) -> Arc<dyn SchemaRegistry> {
        Arc::clone(&self.schema)
    }

    /// Number of vertices stored under `label`.
    pub fn vertex_count(&self, label: LabelId) -> usize {
        self.inner
            .read()
            .tables
            .get(label.0 as usize)
            .map_or(0, |t| t.oids.len())
    }

    /// External identifier stored at `vid`.
    pub fn vertex_oid(&self, label: LabelId, vid: VertexId) -> Option<Any> {
        let inner = self.inner.read();
        inner
            .tables
            .get(label.0 as usize)?
            .oids
            .get(vid.0 as usize)
            .cloned()
    }

    /// Property values stored at `vid`, in column order.
    pub fn vertex_properties(&self, label: LabelId, vid: VertexId) -> Option<Vec<Any>> {
        let inner = self.inner.read();
        let table = inner.tables.get(label.0 as usize)?;
        if vid.0 as usize >= table.oids.len() {
            return None;
        }
        Some(
            table
                .columns
                .iter()
                .map(|col| col[vid.0 as usize].clone())
                .collect(),
        )
    }

    /// Every edge of one `(src, dst, edge)` label triplet, in insertion order.
    pub fn edges(&self, src_label: LabelId, dst_label: LabelId, label: LabelId) -> Vec<EdgeRecord> {
        self.inner
            .read()
            .edges
            .get(&(src_label, dst_label, label))
            .map(|t| t.records.clone())
            .unwrap_or_default()
    }

    /// Outgoing edges of `src` within one label triplet.
    pub fn out_edges(
        &self,
        src_label: LabelId,
        dst_label: LabelId,
        label: LabelId,
        src: VertexId,
    ) -> Vec<EdgeRecord> {
        let inner = self.inner.read();
        let Some(table) = inner.edges.get(&(src_label, dst_label, label)) else {
            return Vec::new();
        };
        table
            .out
            .get(&src)
            .map(|slots| slots.iter().map(|&i| table.records[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of edges across all triplets.
    pub fn edge_count(&self) -> usize {
        self.inner.read().edge_count
    }
}

fn identifier_key(id: &Any) -> Result<OidKey> {
    id.oid_key().ok_or_else(|| {
        PenumbraError::InvalidOwned(format!(
            "vertex identifier of type {} is not indexable",
            id.property_type()
        ))
    })
}

impl GraphStore for MemGraph {
    fn schema(&self) -> &dyn SchemaRegistry {
        self.schema.as_ref()
    }

    fn lookup(&self, label: LabelId, id: &Any) -> Option<VertexId> {
        let key = id.oid_key()?;
        let inner = self.inner.read();
        inner.tables.get(label.0 as usize)?.index.get(&key).copied()
    }

    fn insert_vertex(&self, label: LabelId, id: &Any) -> Result<VertexId> {
        let columns = self.schema.vertex_property_types(label)?.len();
        let key = identifier_key(id)?;
        let mut inner = self.inner.write();
        let table = inner
            .tables
            .get_mut(label.0 as usize)
            .ok_or(PenumbraError::UnknownLabel {
                kind: "vertex",
                label: label.0,
            })?;
        if let Some(&vid) = table.index.get(&key) {
            trace!(label = label.0, vid = vid.0, "graph.insert_vertex.existing");
            return Ok(vid);
        }
        let pos = table.oids.len();
        if pos >= VertexId::SELF_SENTINEL.0 as usize {
            return Err(PenumbraError::Invalid("vertex table full"));
        }
        let vid = VertexId(pos as u32);
        if table.columns.len() != columns {
            table.columns.resize_with(columns, Vec::new);
        }
        for column in &mut table.columns {
            column.push(Any::Empty);
        }
        table.oids.push(id.clone());
        table.index.insert(key, vid);
        trace!(label = label.0, vid = vid.0, "graph.insert_vertex");
        Ok(vid)
    }

    fn ingest_vertex_properties(
        &self,
        label: LabelId,
        vid: VertexId,
        reader: &mut Cursor<'_>,
    ) -> Result<()> {
        let types = self.schema.vertex_property_types(label)?;
        let mut values = Vec::with_capacity(types.len());
        for ty in types {
            let value = Any::decode(reader)?;
            if !ty.accepts(value.property_type()) {
                return Err(PenumbraError::Corruption("vertex property type mismatch"));
            }
            values.push(value);
        }
        let mut inner = self.inner.write();
        let table = inner
            .tables
            .get_mut(label.0 as usize)
            .ok_or(PenumbraError::Corruption("vertex label missing"))?;
        if vid.0 as usize >= table.oids.len() {
            return Err(PenumbraError::Corruption("vertex position out of range"));
        }
        for (column, value) in table.columns.iter_mut().zip(values) {
            column[vid.0 as usize] = value;
        }
        Ok(())
    }

    fn ingest_edge(&self, edge: EdgeSpec, ts: Timestamp, reader: &mut Cursor<'_>) -> Result<()> {
        let property = Any::decode(reader)?;
        if edge.src.is_sentinel() || edge.dst.is_sentinel() {
            return Err(PenumbraError::Corruption("edge endpoint unresolved"));
        }
        let mut inner = self.inner.write();
        for (label, vid) in [(edge.src_label, edge.src), (edge.dst_label, edge.dst)] {
            let len = inner
                .tables
                .get(label.0 as usize)
                .map_or(0, |t| t.oids.len());
            if vid.0 as usize >= len {
                return Err(PenumbraError::Corruption("edge endpoint out of range"));
            }
        }
        let table = inner
            .edges
            .entry((edge.src_label, edge.dst_label, edge.label))
            .or_default();
        let slot = table.records.len();
        table.records.push(EdgeRecord {
            src: edge.src,
            dst: edge.dst,
            property,
            timestamp: ts,
        });
        table.out.entry(edge.src).or_default().push(slot);
        inner.edge_count += 1;
        trace!(
            src = edge.src.0,
            dst = edge.dst.0,
            label = edge.label.0,
            ts,
            "graph.ingest_edge"
        );
        Ok(())
    }
}
