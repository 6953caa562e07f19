use smallvec::SmallVec;
use tracing::{debug, error, trace};

use super::ingest::{ingest_body, EndpointSource};
use super::record::{encode_edge_insert, encode_vertex_insert, RecordType, WalHeader, WAL_HEADER_LEN};
use super::version::TimestampAuthority;
use crate::primitives::wal::DurableLog;
use crate::storage::graph::GraphStore;
use crate::types::{
    Any, Endpoint, LabelId, PenumbraError, PropertyType, Result, Timestamp, VertexId,
    TIMESTAMP_FINISHED,
};

/// Default initial capacity of the staging buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
struct StagedVertex {
    label: LabelId,
    id: Any,
}

/// A write transaction that inserts one vertex plus any number of edges.
///
/// Staging calls validate against the schema and append to a private log
/// record. [`commit`](Self::commit) makes the record durable, then replays it
/// into the graph; [`abort`](Self::abort) discards it. Either releases the
/// timestamp, after which the transaction is finished and further terminal
/// calls are no-ops. Dropping a live transaction aborts it.
///
/// Edges may reference the staged vertex before it exists in the graph: such
/// endpoints are recorded as [`VertexId::SELF_SENTINEL`] and substituted with
/// the vertex's real position during replay.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use penumbra::db::{SingleVertexInsertTransaction, VersionManager};
/// use penumbra::primitives::wal::MemoryWal;
/// use penumbra::storage::{GraphStore, MemGraph, Schema};
/// use penumbra::types::{Any, PropertyType};
///
/// let mut schema = Schema::new();
/// let person = schema.add_vertex_label("person", &[("name", PropertyType::StringView)])?;
/// let graph = MemGraph::new(Arc::new(schema));
/// let wal = MemoryWal::new();
/// let versions = VersionManager::new();
///
/// let ts = versions.acquire_insert_timestamp()?;
/// let mut txn = SingleVertexInsertTransaction::new(&graph, &wal, &versions, ts);
/// txn.add_vertex(person, &Any::Int64(42), &[Any::from("Alice")])?;
/// txn.commit()?;
/// assert!(graph.lookup(person, &Any::Int64(42)).is_some());
/// # Ok::<(), penumbra::types::PenumbraError>(())
/// ```
pub struct SingleVertexInsertTransaction<'a> {
    graph: &'a dyn GraphStore,
    log: &'a dyn DurableLog,
    versions: &'a dyn TimestampAuthority,
    timestamp: Timestamp,
    buf: Vec<u8>,
    vertex: Option<StagedVertex>,
    endpoints: SmallVec<[VertexId; 8]>,
}

impl<'a> SingleVertexInsertTransaction<'a> {
    /// Starts a transaction holding the already acquired timestamp `ts`.
    pub fn new(
        graph: &'a dyn GraphStore,
        log: &'a dyn DurableLog,
        versions: &'a dyn TimestampAuthority,
        ts: Timestamp,
    ) -> Self {
        Self::with_capacity(graph, log, versions, ts, DEFAULT_BUFFER_CAPACITY)
    }

    /// Like [`new`](Self::new) with an explicit staging buffer capacity.
    pub fn with_capacity(
        graph: &'a dyn GraphStore,
        log: &'a dyn DurableLog,
        versions: &'a dyn TimestampAuthority,
        ts: Timestamp,
        capacity: usize,
    ) -> Self {
        let mut buf = Vec::with_capacity(capacity.max(WAL_HEADER_LEN));
        buf.resize(WAL_HEADER_LEN, 0);
        trace!(timestamp = ts, "txn.begin");
        Self {
            graph,
            log,
            versions,
            timestamp: ts,
            buf,
            vertex: None,
            endpoints: SmallVec::new(),
        }
    }

    /// Timestamp held by the transaction, or [`TIMESTAMP_FINISHED`].
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Whether commit or abort already ran.
    pub fn is_finished(&self) -> bool {
        self.timestamp == TIMESTAMP_FINISHED
    }

    /// Length of the record buffer, header included.
    pub fn staged_len(&self) -> usize {
        self.buf.len()
    }

    /// Number of recorded endpoint positions (two per staged edge).
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Label and identifier of the staged vertex, if any.
    pub fn staged_vertex(&self) -> Option<(LabelId, &Any)> {
        self.vertex.as_ref().map(|v| (v.label, &v.id))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_finished() {
            return Err(PenumbraError::Invalid("transaction already finished"));
        }
        Ok(())
    }

    fn vertex_label_name(&self, label: LabelId) -> String {
        self.graph
            .schema()
            .vertex_label_name(label)
            .map_or_else(|_| format!("#{}", label.0), str::to_owned)
    }

    fn edge_label_name(&self, label: LabelId) -> String {
        self.graph
            .schema()
            .edge_label_name(label)
            .map_or_else(|_| format!("#{}", label.0), str::to_owned)
    }

    /// Stages the insert of vertex `id` under `label` with `properties` in
    /// schema column order.
    ///
    /// On failure nothing is staged and the transaction stays usable.
    pub fn add_vertex(&mut self, label: LabelId, id: &Any, properties: &[Any]) -> Result<()> {
        self.ensure_live()?;
        if let Some(staged) = &self.vertex {
            let err = PenumbraError::VertexAlreadyStaged {
                label: self.vertex_label_name(staged.label),
                id: staged.id.to_string(),
            };
            error!(timestamp = self.timestamp, %err, "txn.add_vertex.rejected");
            return Err(err);
        }
        let start = self.buf.len();
        encode_vertex_insert(&mut self.buf, label, id, &[]);
        if let Err(err) = self.append_vertex_properties(label, id, properties) {
            self.buf.truncate(start);
            error!(timestamp = self.timestamp, %err, "txn.add_vertex.rejected");
            return Err(err);
        }
        self.vertex = Some(StagedVertex {
            label,
            id: id.clone(),
        });
        trace!(
            timestamp = self.timestamp,
            label = label.0,
            bytes = self.buf.len() - start,
            "txn.add_vertex"
        );
        Ok(())
    }

    fn append_vertex_properties(
        &mut self,
        label: LabelId,
        id: &Any,
        properties: &[Any],
    ) -> Result<()> {
        let graph = self.graph;
        let types = graph.schema().vertex_property_types(label)?;
        if id.oid_key().is_none() {
            return Err(PenumbraError::InvalidOwned(format!(
                "{} vertex identifier of type {} is not indexable",
                self.vertex_label_name(label),
                id.property_type()
            )));
        }
        if types.len() != properties.len() {
            return Err(PenumbraError::PropertyCountMismatch {
                label: self.vertex_label_name(label),
                expected: types.len(),
                actual: properties.len(),
            });
        }
        for (index, (expected, value)) in types.iter().zip(properties).enumerate() {
            let actual = value.property_type();
            if !expected.accepts(actual) {
                return Err(PenumbraError::PropertyTypeMismatch {
                    label: self.vertex_label_name(label),
                    index: Some(index),
                    expected: *expected,
                    actual,
                });
            }
            value.encode(&mut self.buf);
        }
        Ok(())
    }

    fn resolve(&self, endpoint: Endpoint, label: LabelId, id: &Any) -> Result<VertexId> {
        if let Some(staged) = &self.vertex {
            if staged.label == label && staged.id.oid_key() == id.oid_key() {
                return Ok(VertexId::SELF_SENTINEL);
            }
        }
        self.graph
            .lookup(label, id)
            .ok_or_else(|| PenumbraError::VertexNotFound {
                endpoint,
                label: self.vertex_label_name(label),
                id: id.to_string(),
            })
    }

    fn check_edge_property(
        &self,
        src_label: LabelId,
        dst_label: LabelId,
        edge_label: LabelId,
        property: &Any,
    ) -> Result<()> {
        let types = self
            .graph
            .schema()
            .edge_property_types(src_label, dst_label, edge_label)?;
        if let Some(fields) = property.as_record() {
            if fields.len() != types.len() {
                return Err(PenumbraError::PropertyCountMismatch {
                    label: self.edge_label_name(edge_label),
                    expected: types.len(),
                    actual: fields.len(),
                });
            }
            for (index, (expected, field)) in types.iter().zip(fields).enumerate() {
                let actual = field.property_type();
                if *expected != actual {
                    return Err(PenumbraError::PropertyTypeMismatch {
                        label: self.edge_label_name(edge_label),
                        index: Some(index),
                        expected: *expected,
                        actual,
                    });
                }
            }
            return Ok(());
        }
        let expected = match types {
            [] => PropertyType::Empty,
            [single] => *single,
            _ => PropertyType::Record,
        };
        let actual = property.property_type();
        if expected != actual {
            return Err(PenumbraError::PropertyTypeMismatch {
                label: self.edge_label_name(edge_label),
                index: None,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Stages an edge insert.
    ///
    /// Each endpoint naming the staged vertex (same label, identifier equal
    /// after integer widths are normalised) is deferred; every other endpoint must already exist in the graph.
    /// `property` is a single value, [`Any::Empty`] for property-less edges,
    /// or an [`Any::Record`] when the edge declares several properties.
    ///
    /// On failure nothing is staged and the transaction stays usable.
    pub fn add_edge(
        &mut self,
        src_label: LabelId,
        src: &Any,
        dst_label: LabelId,
        dst: &Any,
        edge_label: LabelId,
        property: &Any,
    ) -> Result<()> {
        self.ensure_live()?;
        let staged = self
            .resolve(Endpoint::Source, src_label, src)
            .and_then(|src_vid| {
                let dst_vid = self.resolve(Endpoint::Destination, dst_label, dst)?;
                self.check_edge_property(src_label, dst_label, edge_label, property)?;
                Ok((src_vid, dst_vid))
            });
        let (src_vid, dst_vid) = match staged {
            Ok(pair) => pair,
            Err(err) => {
                error!(timestamp = self.timestamp, %err, "txn.add_edge.rejected");
                return Err(err);
            }
        };
        let start = self.buf.len();
        encode_edge_insert(
            &mut self.buf,
            src_label,
            src,
            dst_label,
            dst,
            edge_label,
            property,
        );
        self.endpoints.push(src_vid);
        self.endpoints.push(dst_vid);
        trace!(
            timestamp = self.timestamp,
            src = %src_vid,
            dst = %dst_vid,
            label = edge_label.0,
            bytes = self.buf.len() - start,
            "txn.add_edge"
        );
        Ok(())
    }

    /// Logs the staged record durably, then applies it to the graph.
    ///
    /// A finished transaction commits as a no-op. A transaction with nothing
    /// staged releases its timestamp without touching the log. If the append
    /// fails, the transaction is aborted, the graph is left untouched and
    /// [`PenumbraError::WalAppend`] is returned.
    pub fn commit(&mut self) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        if self.buf.len() == WAL_HEADER_LEN {
            trace!(timestamp = self.timestamp, "txn.commit.empty");
            self.release();
            return Ok(());
        }
        let header = WalHeader {
            length: (self.buf.len() - WAL_HEADER_LEN) as u64,
            record_type: RecordType::Insert,
            timestamp: self.timestamp,
        };
        self.buf[..WAL_HEADER_LEN].copy_from_slice(&header.encode());
        if let Err(err) = self.log.append(&self.buf) {
            error!(timestamp = self.timestamp, %err, "txn.commit.append_failed");
            self.abort();
            return Err(PenumbraError::WalAppend(err.to_string()));
        }
        let source = EndpointSource::Staged {
            vertex: self.staged_vertex(),
            endpoints: &self.endpoints,
        };
        let outcome = ingest_body(
            self.graph,
            &self.buf[WAL_HEADER_LEN..],
            self.timestamp,
            source,
        );
        let ts = self.timestamp;
        let len = self.buf.len();
        self.release();
        match outcome {
            Ok(stats) => {
                debug!(
                    timestamp = ts,
                    record_len = len,
                    vertices = stats.vertices,
                    edges = stats.edges,
                    "txn.commit"
                );
                Ok(())
            }
            Err(err) => {
                error!(timestamp = ts, %err, "txn.commit.ingest_failed");
                Err(err)
            }
        }
    }

    /// Discards everything staged and releases the timestamp. No-op once finished.
    pub fn abort(&mut self) {
        if self.is_finished() {
            return;
        }
        error!(
            timestamp = self.timestamp,
            staged_bytes = self.buf.len() - WAL_HEADER_LEN,
            "txn.abort"
        );
        self.release();
    }

    fn release(&mut self) {
        self.versions.release_insert_timestamp(self.timestamp);
        self.clear();
    }

    fn clear(&mut self) {
        self.timestamp = TIMESTAMP_FINISHED;
        self.buf.clear();
        self.buf.resize(WAL_HEADER_LEN, 0);
        self.vertex = None;
        self.endpoints.clear();
    }
}

impl Drop for SingleVertexInsertTransaction<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}
