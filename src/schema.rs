//! Label catalog: vertex/edge label ids, property layouts and edge strategies.

use crate::error::{GraphError, Result};
use crate::id_indexer::IdIndexer;
use crate::types::{EdgeStrategy, LabelId, PropertyType, StorageStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Labels are `u8`; one id is kept out of range.
pub const MAX_LABEL_NUM: usize = LabelId::MAX as usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexSchema {
    pub property_names: Vec<String>,
    pub properties: Vec<PropertyType>,
    pub storage: Vec<StorageStrategy>,
    pub max_vnum: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSchema {
    pub property_names: Vec<String>,
    pub properties: Vec<PropertyType>,
    pub oe_strategy: EdgeStrategy,
    pub ie_strategy: EdgeStrategy,
}

impl EdgeSchema {
    /// Payload type stored in the adjacency lists.
    pub fn data_type(&self) -> PropertyType {
        self.properties.first().copied().unwrap_or(PropertyType::Empty)
    }
}

/// `(src, dst, edge)` label triple.
pub type EdgeTriplet = (LabelId, LabelId, LabelId);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    vlabel_indexer: IdIndexer<String>,
    elabel_indexer: IdIndexer<String>,
    vertices: Vec<VertexSchema>,
    edges: BTreeMap<EdgeTriplet, EdgeSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vertex label. Empty `strategies` means every property is stored.
    pub fn add_vertex_label(
        &mut self,
        name: &str,
        properties: &[(&str, PropertyType)],
        strategies: &[StorageStrategy],
        max_vnum: usize,
    ) -> Result<LabelId> {
        if self.vlabel_indexer.get_index(name).is_some() {
            return Err(GraphError::DuplicateLabel(name.to_string()));
        }
        if self.vlabel_indexer.size() >= MAX_LABEL_NUM {
            return Err(GraphError::TooManyLabels(MAX_LABEL_NUM));
        }
        let label = self.vlabel_indexer.add(name.to_string()) as LabelId;
        let storage = (0..properties.len())
            .map(|i| strategies.get(i).copied().unwrap_or_default())
            .collect();
        self.vertices.push(VertexSchema {
            property_names: properties.iter().map(|(n, _)| n.to_string()).collect(),
            properties: properties.iter().map(|(_, t)| *t).collect(),
            storage,
            max_vnum,
        });
        Ok(label)
    }

    /// Register `edge_name` between two existing vertex labels. The edge
    /// label id is shared by every triple that uses the same name.
    pub fn add_edge_label(
        &mut self,
        src: &str,
        dst: &str,
        edge_name: &str,
        properties: &[(&str, PropertyType)],
        oe_strategy: EdgeStrategy,
        ie_strategy: EdgeStrategy,
    ) -> Result<LabelId> {
        if properties.len() > 1 {
            return Err(GraphError::TooManyEdgeProperties(properties.len()));
        }
        let src_label = self.get_vertex_label_id(src)?;
        let dst_label = self.get_vertex_label_id(dst)?;
        let edge_label = match self.elabel_indexer.get_index(edge_name) {
            Some(id) => id as LabelId,
            None => {
                if self.elabel_indexer.size() >= MAX_LABEL_NUM {
                    return Err(GraphError::TooManyLabels(MAX_LABEL_NUM));
                }
                self.elabel_indexer.add(edge_name.to_string()) as LabelId
            }
        };
        let key = (src_label, dst_label, edge_label);
        if self.edges.contains_key(&key) {
            return Err(GraphError::DuplicateLabel(format!("{}-[{}]->{}", src, edge_name, dst)));
        }
        self.edges.insert(
            key,
            EdgeSchema {
                property_names: properties.iter().map(|(n, _)| n.to_string()).collect(),
                properties: properties.iter().map(|(_, t)| *t).collect(),
                oe_strategy,
                ie_strategy,
            },
        );
        Ok(edge_label)
    }

    pub fn vertex_label_num(&self) -> usize {
        self.vlabel_indexer.size()
    }

    pub fn edge_label_num(&self) -> usize {
        self.elabel_indexer.size()
    }

    pub fn contains_vertex_label(&self, name: &str) -> bool {
        self.vlabel_indexer.get_index(name).is_some()
    }

    pub fn contains_edge_label(&self, name: &str) -> bool {
        self.elabel_indexer.get_index(name).is_some()
    }

    pub fn get_vertex_label_id(&self, name: &str) -> Result<LabelId> {
        self.vlabel_indexer
            .get_index(name)
            .map(|id| id as LabelId)
            .ok_or_else(|| GraphError::UnknownLabel(name.to_string()))
    }

    pub fn get_edge_label_id(&self, name: &str) -> Result<LabelId> {
        self.elabel_indexer
            .get_index(name)
            .map(|id| id as LabelId)
            .ok_or_else(|| GraphError::UnknownLabel(name.to_string()))
    }

    pub fn get_vertex_label_name(&self, label: LabelId) -> Result<&str> {
        self.vlabel_indexer
            .get_key(label as usize)
            .map(String::as_str)
            .ok_or(GraphError::LabelOutOfRange(label))
    }

    pub fn get_edge_label_name(&self, label: LabelId) -> Result<&str> {
        self.elabel_indexer
            .get_key(label as usize)
            .map(String::as_str)
            .ok_or(GraphError::LabelOutOfRange(label))
    }

    pub fn vertex_schema(&self, label: LabelId) -> Result<&VertexSchema> {
        self.vertices.get(label as usize).ok_or(GraphError::LabelOutOfRange(label))
    }

    pub fn get_vertex_properties(&self, label: LabelId) -> Result<&[PropertyType]> {
        Ok(&self.vertex_schema(label)?.properties)
    }

    pub fn get_vertex_property_names(&self, label: LabelId) -> Result<&[String]> {
        Ok(&self.vertex_schema(label)?.property_names)
    }

    pub fn get_vertex_storage_strategies(&self, label: LabelId) -> Result<&[StorageStrategy]> {
        Ok(&self.vertex_schema(label)?.storage)
    }

    pub fn get_max_vnum(&self, label: LabelId) -> Result<usize> {
        Ok(self.vertex_schema(label)?.max_vnum)
    }

    /// Whether edges are configured for this triple. Every load and query
    /// path checks this before touching adjacency storage.
    pub fn exist(&self, src: LabelId, dst: LabelId, edge: LabelId) -> bool {
        self.edges.contains_key(&(src, dst, edge))
    }

    /// Whether the triple exists, so its property list can be consulted.
    pub fn valid_edge_property(&self, src: LabelId, dst: LabelId, edge: LabelId) -> bool {
        self.exist(src, dst, edge)
    }

    pub fn edge_schema(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<&EdgeSchema> {
        self.edges
            .get(&(src, dst, edge))
            .ok_or(GraphError::EdgeTripletNotFound { src, dst, edge })
    }

    pub fn get_edge_properties(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<&[PropertyType]> {
        Ok(&self.edge_schema(src, dst, edge)?.properties)
    }

    pub fn get_outgoing_edge_strategy(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<EdgeStrategy> {
        Ok(self.edge_schema(src, dst, edge)?.oe_strategy)
    }

    pub fn get_incoming_edge_strategy(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<EdgeStrategy> {
        Ok(self.edge_schema(src, dst, edge)?.ie_strategy)
    }

    /// All configured triples in `(src, dst, edge)` order.
    pub fn edge_triplets(&self) -> impl Iterator<Item = (EdgeTriplet, &EdgeSchema)> + '_ {
        self.edges.iter().map(|(k, v)| (*k, v))
    }

    /// `(src, dst)` pairs that carry `edge`.
    pub fn edge_endpoints(&self, edge: LabelId) -> Vec<(LabelId, LabelId)> {
        self.edges.keys().filter(|k| k.2 == edge).map(|k| (k.0, k.1)).collect()
    }

    pub fn serialize(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn deserialize(path: &Path) -> Result<Self> {
        let schema: Schema = bincode::deserialize_from(BufReader::new(File::open(path)?))?;
        if schema.vertices.len() != schema.vlabel_indexer.size() {
            return Err(GraphError::corrupt(path, "vertex label table does not match label names"));
        }
        if let Some(((s, d, e), _)) = schema.edge_triplets().find(|((s, d, e), _)| {
            *s as usize >= schema.vertex_label_num()
                || *d as usize >= schema.vertex_label_num()
                || *e as usize >= schema.edge_label_num()
        }) {
            return Err(GraphError::corrupt(path, format!("edge triplet ({}, {}, {}) out of range", s, d, e)));
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn modern() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_vertex_label("person", &[("id", PropertyType::Int64), ("name", PropertyType::String)], &[], 100)
            .unwrap();
        schema
            .add_vertex_label("software", &[("name", PropertyType::String)], &[], 100)
            .unwrap();
        schema
            .add_edge_label("person", "person", "knows", &[], EdgeStrategy::Multiple, EdgeStrategy::Multiple)
            .unwrap();
        schema
            .add_edge_label(
                "person",
                "software",
                "created",
                &[("weight", PropertyType::Int32)],
                EdgeStrategy::Single,
                EdgeStrategy::Multiple,
            )
            .unwrap();
        schema
    }

    #[test]
    fn test_label_ids_by_registration_order() {
        let schema = modern();
        assert_eq!(schema.get_vertex_label_id("person").unwrap(), 0);
        assert_eq!(schema.get_vertex_label_id("software").unwrap(), 1);
        assert_eq!(schema.get_edge_label_id("created").unwrap(), 1);
        assert_eq!(schema.get_vertex_label_name(1).unwrap(), "software");
        assert!(matches!(schema.get_vertex_label_id("city"), Err(GraphError::UnknownLabel(_))));
    }

    #[test]
    fn test_triplet_lookup() {
        let schema = modern();
        assert!(schema.exist(0, 0, 0));
        assert!(schema.exist(0, 1, 1));
        assert!(!schema.exist(1, 0, 1));
        assert_eq!(schema.get_outgoing_edge_strategy(0, 1, 1).unwrap(), EdgeStrategy::Single);
        assert_eq!(schema.edge_schema(0, 1, 1).unwrap().data_type(), PropertyType::Int32);
        assert_eq!(schema.edge_schema(0, 0, 0).unwrap().data_type(), PropertyType::Empty);
        assert!(matches!(
            schema.get_edge_properties(1, 1, 0),
            Err(GraphError::EdgeTripletNotFound { src: 1, dst: 1, edge: 0 })
        ));
        assert_eq!(schema.edge_endpoints(1), vec![(0, 1)]);
    }

    #[test]
    fn test_registration_errors() {
        let mut schema = modern();
        assert!(matches!(
            schema.add_vertex_label("person", &[], &[], 1),
            Err(GraphError::DuplicateLabel(_))
        ));
        assert!(matches!(
            schema.add_edge_label(
                "person",
                "person",
                "likes",
                &[("a", PropertyType::Int32), ("b", PropertyType::Int32)],
                EdgeStrategy::Multiple,
                EdgeStrategy::Multiple
            ),
            Err(GraphError::TooManyEdgeProperties(2))
        ));
        assert!(schema
            .add_edge_label("person", "city", "lives", &[], EdgeStrategy::Single, EdgeStrategy::Multiple)
            .is_err());
    }

    #[test]
    fn test_catalog_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.bin");
        let schema = modern();
        schema.serialize(&path).unwrap();
        let back = Schema::deserialize(&path).unwrap();
        assert_eq!(back.vertex_label_num(), 2);
        assert_eq!(back.edge_label_num(), 2);
        assert_eq!(back.get_vertex_property_names(0).unwrap(), &["id".to_string(), "name".to_string()]);
        assert_eq!(back.get_incoming_edge_strategy(0, 1, 1).unwrap(), EdgeStrategy::Multiple);
        assert_eq!(back.get_max_vnum(1).unwrap(), 100);
    }
}
