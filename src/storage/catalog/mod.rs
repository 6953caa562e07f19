#![forbid(unsafe_code)]
//! Label-indexed schema: declared property types per vertex label and per
//! `(source, destination, edge)` label triplet.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{LabelId, PenumbraError, PropertyType, Result};

/// Read-only schema lookups consulted while staging and replaying.
pub trait SchemaRegistry: Send + Sync {
    /// Declared property types of a vertex label, in column order.
    fn vertex_property_types(&self, label: LabelId) -> Result<&[PropertyType]>;
    /// Declared property types of an edge triplet, in order.
    ///
    /// An empty list means the edge carries no property and expects
    /// [`crate::types::Any::Empty`].
    fn edge_property_types(
        &self,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
    ) -> Result<&[PropertyType]>;
    /// Name of a vertex label.
    fn vertex_label_name(&self, label: LabelId) -> Result<&str>;
    /// Name of an edge label.
    fn edge_label_name(&self, label: LabelId) -> Result<&str>;
    /// Number of registered vertex labels.
    fn vertex_label_count(&self) -> usize;
}

/// One named, typed property column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: PropertyType,
}

/// Serialized vertex label definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexLabelDef {
    /// Label name.
    pub label: String,
    /// Property columns in order.
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// Serialized edge triplet definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLabelDef {
    /// Source vertex label name.
    pub src: String,
    /// Destination vertex label name.
    pub dst: String,
    /// Edge label name.
    pub label: String,
    /// Property columns in order.
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// Serde-friendly schema description, e.g. loaded from TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDef {
    /// Vertex labels; ids are assigned in order.
    #[serde(default, rename = "vertex")]
    pub vertices: Vec<VertexLabelDef>,
    /// Edge triplets; edge label ids are assigned on first use of a name.
    #[serde(default, rename = "edge")]
    pub edges: Vec<EdgeLabelDef>,
}

#[derive(Clone, Debug)]
struct VertexLabel {
    name: String,
    names: Vec<String>,
    types: Vec<PropertyType>,
}

#[derive(Clone, Debug)]
struct EdgeTriplet {
    names: Vec<String>,
    types: Vec<PropertyType>,
}

/// In-memory [`SchemaRegistry`] built label by label.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    vertex_labels: Vec<VertexLabel>,
    edge_labels: Vec<String>,
    vertex_ids: FxHashMap<String, LabelId>,
    edge_ids: FxHashMap<String, LabelId>,
    triplets: FxHashMap<(LabelId, LabelId, LabelId), EdgeTriplet>,
}

const MAX_LABELS: usize = u8::MAX as usize + 1;

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a vertex label and returns its id.
    pub fn add_vertex_label(
        &mut self,
        name: &str,
        properties: &[(&str, PropertyType)],
    ) -> Result<LabelId> {
        if self.vertex_ids.contains_key(name) {
            return Err(PenumbraError::InvalidOwned(format!(
                "vertex label {name} already registered"
            )));
        }
        if self.vertex_labels.len() >= MAX_LABELS {
            return Err(PenumbraError::Invalid("too many vertex labels"));
        }
        let id = LabelId(self.vertex_labels.len() as u8);
        self.vertex_labels.push(VertexLabel {
            name: name.to_owned(),
            names: properties.iter().map(|(n, _)| (*n).to_owned()).collect(),
            types: properties.iter().map(|(_, t)| *t).collect(),
        });
        self.vertex_ids.insert(name.to_owned(), id);
        trace!(label = name, id = id.0, "catalog.vertex_label");
        Ok(id)
    }

    /// Registers an edge triplet and returns the edge label id.
    ///
    /// Edge label ids are shared between triplets with the same edge name.
    pub fn add_edge_label(
        &mut self,
        src: &str,
        dst: &str,
        name: &str,
        properties: &[(&str, PropertyType)],
    ) -> Result<LabelId> {
        let src_id = self.require_vertex_label(src)?;
        let dst_id = self.require_vertex_label(dst)?;
        let edge_id = match self.edge_ids.get(name) {
            Some(id) => *id,
            None => {
                if self.edge_labels.len() >= MAX_LABELS {
                    return Err(PenumbraError::Invalid("too many edge labels"));
                }
                let id = LabelId(self.edge_labels.len() as u8);
                self.edge_labels.push(name.to_owned());
                self.edge_ids.insert(name.to_owned(), id);
                id
            }
        };
        let key = (src_id, dst_id, edge_id);
        if self.triplets.contains_key(&key) {
            return Err(PenumbraError::InvalidOwned(format!(
                "edge {src}-[{name}]->{dst} already registered"
            )));
        }
        self.triplets.insert(
            key,
            EdgeTriplet {
                names: properties.iter().map(|(n, _)| (*n).to_owned()).collect(),
                types: properties.iter().map(|(_, t)| *t).collect(),
            },
        );
        trace!(src, dst, label = name, id = edge_id.0, "catalog.edge_label");
        Ok(edge_id)
    }

    fn require_vertex_label(&self, name: &str) -> Result<LabelId> {
        self.vertex_label_id(name).ok_or_else(|| {
            PenumbraError::InvalidOwned(format!("vertex label {name} not registered"))
        })
    }

    /// Looks up a vertex label id by name.
    pub fn vertex_label_id(&self, name: &str) -> Option<LabelId> {
        self.vertex_ids.get(name).copied()
    }

    /// Looks up an edge label id by name.
    pub fn edge_label_id(&self, name: &str) -> Option<LabelId> {
        self.edge_ids.get(name).copied()
    }

    /// Column names of a vertex label.
    pub fn vertex_property_names(&self, label: LabelId) -> Result<&[String]> {
        Ok(&self.vertex_label(label)?.names)
    }

    /// Property names of an edge triplet.
    pub fn edge_property_names(
        &self,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
    ) -> Result<&[String]> {
        Ok(&self.triplet(src, dst, edge)?.names)
    }

    /// Number of registered edge labels.
    pub fn edge_label_count(&self) -> usize {
        self.edge_labels.len()
    }

    fn vertex_label(&self, label: LabelId) -> Result<&VertexLabel> {
        self.vertex_labels
            .get(label.0 as usize)
            .ok_or(PenumbraError::UnknownLabel {
                kind: "vertex",
                label: label.0,
            })
    }

    fn triplet(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<&EdgeTriplet> {
        let src_name = &self.vertex_label(src)?.name;
        let dst_name = &self.vertex_label(dst)?.name;
        let edge_name = self.edge_label_name(edge)?;
        self.triplets.get(&(src, dst, edge)).ok_or_else(|| {
            PenumbraError::InvalidOwned(format!(
                "edge {src_name}-[{edge_name}]->{dst_name} not declared"
            ))
        })
    }

    /// Builds a schema from its serialized description.
    pub fn from_def(def: &SchemaDef) -> Result<Self> {
        let mut schema = Schema::new();
        for vertex in &def.vertices {
            let props = borrowed(&vertex.properties);
            schema.add_vertex_label(&vertex.label, &props)?;
        }
        for edge in &def.edges {
            let props = borrowed(&edge.properties);
            schema.add_edge_label(&edge.src, &edge.dst, &edge.label, &props)?;
        }
        Ok(schema)
    }

    /// Parses a TOML schema description.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let def: SchemaDef = toml::from_str(src)
            .map_err(|err| PenumbraError::InvalidOwned(format!("schema: {err}")))?;
        Self::from_def(&def)
    }

    /// Reads and parses a TOML schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }
}

fn borrowed(props: &[PropertyDef]) -> Vec<(&str, PropertyType)> {
    props.iter().map(|p| (p.name.as_str(), p.ty)).collect()
}

impl SchemaRegistry for Schema {
    fn vertex_property_types(&self, label: LabelId) -> Result<&[PropertyType]> {
        Ok(&self.vertex_label(label)?.types)
    }

    fn edge_property_types(
        &self,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
    ) -> Result<&[PropertyType]> {
        Ok(&self.triplet(src, dst, edge)?.types)
    }

    fn vertex_label_name(&self, label: LabelId) -> Result<&str> {
        Ok(&self.vertex_label(label)?.name)
    }

    fn edge_label_name(&self, label: LabelId) -> Result<&str> {
        self.edge_labels
            .get(label.0 as usize)
            .map(String::as_str)
            .ok_or(PenumbraError::UnknownLabel {
                kind: "edge",
                label: label.0,
            })
    }

    fn vertex_label_count(&self) -> usize {
        self.vertex_labels.len()
    }
}
