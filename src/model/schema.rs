//! Static schema records.
//!
//! A schema describes a query graph up front: a label, optional preselected
//! values and the relations to expand beneath it. Providers also use it to
//! describe a label's outgoing relations without a discovery query.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{RelationshipSegment, Row};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub label: String,
    /// Rows preselected as values of this node
    #[serde(default)]
    pub value: Vec<Row>,
    #[serde(default)]
    pub rel: Vec<SchemaRelation>,
    /// Create a `GROUP` node instead of a `CHOOSE` node
    #[serde(default)]
    pub group: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelation {
    pub label: String,
    pub target: SchemaNode,
    #[serde(default)]
    pub is_reverse: bool,
}

impl SchemaNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: vec![],
            rel: vec![],
            group: false,
        }
    }

    /// Load a schema from a YAML (or JSON) file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse schema file {}", path.display()))
    }

    /// Relationship segments described by this node's relations.
    pub fn segments(&self) -> Vec<RelationshipSegment> {
        let mut segments: Vec<RelationshipSegment> = self
            .rel
            .iter()
            .map(|rel| RelationshipSegment {
                is_reverse: rel.is_reverse,
                ..RelationshipSegment::new(rel.label.clone(), rel.target.label.clone(), 0)
            })
            .collect();
        RelationshipSegment::layout(&mut segments);
        segments
    }
}
