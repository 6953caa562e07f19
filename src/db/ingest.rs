//! Applies the operations of an insert record to a graph store.
//!
//! Two sources feed this: a transaction committing its own buffer, which
//! already resolved every edge endpoint while staging, and recovery reading
//! records back from the log, which resolves endpoints by identifier.

use tracing::error;

use crate::db::record::OpTag;
use crate::primitives::bytes::buf::Cursor;
use crate::storage::graph::{EdgeSpec, GraphStore};
use crate::types::{Any, LabelId, PenumbraError, Result, Timestamp, VertexId};

/// Where edge endpoint positions come from during replay.
#[derive(Clone, Copy, Debug)]
pub enum EndpointSource<'a> {
    /// Positions resolved at staging time, two per edge in staging order.
    /// [`VertexId::SELF_SENTINEL`] entries stand for the staged vertex.
    Staged {
        /// Label and identifier captured by the vertex-insert staging call.
        vertex: Option<(LabelId, &'a Any)>,
        /// Flattened `(src, dst)` positions.
        endpoints: &'a [VertexId],
    },
    /// No staging state: identifiers embedded in the record are looked up.
    Durable,
}

/// Counts of applied operations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IngestStats {
    /// Vertex inserts applied.
    pub vertices: usize,
    /// Edge inserts applied.
    pub edges: usize,
}

/// Replays the body of an insert record (header already stripped).
///
/// # Panics
///
/// With [`EndpointSource::Staged`], an unknown op tag means the transaction's
/// own buffer is not what it encoded; the process cannot continue safely and
/// this panics. With [`EndpointSource::Durable`] the same condition is
/// reported as [`PenumbraError::Corruption`].
pub fn ingest_body(
    graph: &dyn GraphStore,
    body: &[u8],
    ts: Timestamp,
    source: EndpointSource<'_>,
) -> Result<IngestStats> {
    let mut cur = Cursor::new(body);
    let mut stats = IngestStats::default();
    let mut inserted: Option<VertexId> = None;
    let mut next_endpoint = 0usize;

    while !cur.is_empty() {
        let raw = cur.u8()?;
        match OpTag::from_u8(raw) {
            Some(OpTag::InsertVertex) => {
                let label = LabelId(cur.u8()?);
                let decoded = Any::decode(&mut cur)?;
                let vid = match source {
                    EndpointSource::Staged {
                        vertex: Some((staged_label, staged_id)),
                        ..
                    } => graph.insert_vertex(staged_label, staged_id)?,
                    EndpointSource::Staged { vertex: None, .. } => {
                        return Err(PenumbraError::Corruption(
                            "vertex insert without staged identity",
                        ))
                    }
                    EndpointSource::Durable => graph.insert_vertex(label, &decoded)?,
                };
                graph.ingest_vertex_properties(label, vid, &mut cur)?;
                inserted = Some(vid);
                stats.vertices += 1;
            }
            Some(OpTag::InsertEdge) => {
                let src_label = LabelId(cur.u8()?);
                let src_id = Any::decode(&mut cur)?;
                let dst_label = LabelId(cur.u8()?);
                let dst_id = Any::decode(&mut cur)?;
                let edge_label = LabelId(cur.u8()?);
                let (src, dst) = match source {
                    EndpointSource::Staged { endpoints, .. } => {
                        let pair = endpoints
                            .get(next_endpoint..next_endpoint + 2)
                            .ok_or(PenumbraError::Corruption("endpoint sequence exhausted"))?;
                        next_endpoint += 2;
                        (
                            substitute(pair[0], inserted)?,
                            substitute(pair[1], inserted)?,
                        )
                    }
                    EndpointSource::Durable => (
                        graph
                            .lookup(src_label, &src_id)
                            .ok_or(PenumbraError::Corruption("edge source missing on replay"))?,
                        graph.lookup(dst_label, &dst_id).ok_or(PenumbraError::Corruption(
                            "edge destination missing on replay",
                        ))?,
                    ),
                };
                let spec = EdgeSpec {
                    src_label,
                    src,
                    dst_label,
                    dst,
                    label: edge_label,
                };
                graph.ingest_edge(spec, ts, &mut cur)?;
                stats.edges += 1;
            }
            None => match source {
                EndpointSource::Staged { .. } => {
                    error!(op = raw, timestamp = ts, "ingest.unknown_op");
                    panic!("unknown op tag {raw} in committed insert record at timestamp {ts}");
                }
                EndpointSource::Durable => {
                    return Err(PenumbraError::Corruption("unknown wal op tag"));
                }
            },
        }
    }
    Ok(stats)
}

fn substitute(vid: VertexId, inserted: Option<VertexId>) -> Result<VertexId> {
    if !vid.is_sentinel() {
        return Ok(vid);
    }
    inserted.ok_or(PenumbraError::Corruption(
        "self endpoint before vertex insert",
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::record::{encode_edge_insert, encode_vertex_insert};
    use crate::storage::catalog::Schema;
    use crate::storage::graph::MemGraph;
    use crate::types::PropertyType;

    fn graph() -> MemGraph {
        let mut schema = Schema::new();
        schema
            .add_vertex_label("person", &[("name", PropertyType::StringView)])
            .unwrap();
        schema
            .add_edge_label("person", "person", "knows", &[("w", PropertyType::Int32)])
            .unwrap();
        MemGraph::new(Arc::new(schema))
    }

    #[test]
    fn staged_sentinels_resolve_to_inserted_vertex() {
        let g = graph();
        let existing = g.insert_vertex(LabelId(0), &Any::Int64(7)).unwrap();
        let id = Any::Int64(42);
        let mut body = Vec::new();
        encode_vertex_insert(&mut body, LabelId(0), &id, &[Any::from("Alice")]);
        encode_edge_insert(
            &mut body,
            LabelId(0),
            &id,
            LabelId(0),
            &Any::Int64(7),
            LabelId(0),
            &Any::Int32(1),
        );
        let endpoints = [VertexId::SELF_SENTINEL, existing];
        let stats = ingest_body(
            &g,
            &body,
            3,
            EndpointSource::Staged {
                vertex: Some((LabelId(0), &id)),
                endpoints: &endpoints,
            },
        )
        .unwrap();
        assert_eq!(stats, IngestStats { vertices: 1, edges: 1 });
        let new_vid = g.lookup(LabelId(0), &id).unwrap();
        let edges = g.edges(LabelId(0), LabelId(0), LabelId(0));
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].src, edges[0].dst, edges[0].timestamp), (new_vid, existing, 3));
    }

    #[test]
    fn durable_replay_looks_up_identifiers() {
        let g = graph();
        g.insert_vertex(LabelId(0), &Any::Int64(7)).unwrap();
        let mut body = Vec::new();
        encode_vertex_insert(&mut body, LabelId(0), &Any::Int64(1), &[Any::from("B")]);
        encode_edge_insert(
            &mut body,
            LabelId(0),
            &Any::Int64(7),
            LabelId(0),
            &Any::Int64(1),
            LabelId(0),
            &Any::Int32(9),
        );
        ingest_body(&g, &body, 4, EndpointSource::Durable).unwrap();
        let edges = g.edges(LabelId(0), LabelId(0), LabelId(0));
        assert_eq!(edges[0].src, VertexId(0));
        assert_eq!(edges[0].dst, VertexId(1));
    }

    #[test]
    fn durable_replay_reports_unknown_op_as_corruption() {
        let g = graph();
        assert!(matches!(
            ingest_body(&g, &[7], 1, EndpointSource::Durable),
            Err(PenumbraError::Corruption("unknown wal op tag"))
        ));
    }

    #[test]
    #[should_panic(expected = "unknown op tag 7")]
    fn staged_replay_panics_on_unknown_op() {
        let g = graph();
        let _ = ingest_body(
            &g,
            &[7],
            1,
            EndpointSource::Staged {
                vertex: None,
                endpoints: &[],
            },
        );
    }
}
