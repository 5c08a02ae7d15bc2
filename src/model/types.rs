//! Query graph data types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{Attribute, INTERNAL_ID_COLUMN};
use crate::query::COUNT_COLUMN;

/// A parsed result row: column name → value.
pub type Row = serde_json::Map<String, Value>;

/// Node identifier. Monotonic for the lifetime of a graph, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "l{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// The query's return subject; exactly one per graph
    Root,
    /// Open entity placeholder pending selection
    Choose,
    /// Candidate value surfaced for selection
    Value,
    /// Organizational node, never counted
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkType {
    /// Graph-pattern edge between two query nodes
    Relation,
    /// Node to one of its candidate value nodes
    Value,
    /// Presentation only
    Segment,
}

/// Rendering anchor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One candidate outgoing relation type + target label of a node.
///
/// The angles are only used for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSegment {
    pub label: String,
    pub target: String,
    pub count: u64,
    #[serde(default)]
    pub is_reverse: bool,
    #[serde(default)]
    pub start_angle: f64,
    #[serde(default)]
    pub end_angle: f64,
    #[serde(default)]
    pub direction_angle: f64,
}

impl RelationshipSegment {
    pub fn new(label: impl Into<String>, target: impl Into<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            target: target.into(),
            count,
            is_reverse: false,
            start_angle: 0.0,
            end_angle: 0.0,
            direction_angle: 0.0,
        }
    }

    /// Give every segment an equal `[start, end)` slice of the circle.
    pub fn layout(segments: &mut [Self]) {
        if segments.is_empty() {
            return;
        }
        let slice = std::f64::consts::TAU / segments.len() as f64;
        for (i, segment) in segments.iter_mut().enumerate() {
            segment.start_angle = slice * i as f64;
            segment.end_angle = slice * (i + 1) as f64;
            segment.direction_angle = (segment.start_angle + segment.end_angle) / 2.0;
        }
    }
}

/// A value selected on a node, turning it into a concrete constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedValue {
    /// Id of the value node it was selected from
    pub id: NodeId,
    pub label: String,
    pub attributes: Row,
    pub internal_id: Option<i64>,
    pub count: u64,
}

impl SelectedValue {
    /// Value bound to the node's constraint parameter.
    pub fn constraint_value(&self, attribute: &Attribute) -> Value {
        match attribute {
            Attribute::InternalId => self.internal_id.map(Value::from).unwrap_or(Value::Null),
            Attribute::Property(name) => self.attributes.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

/// Constraint value carried by a raw row for the given attribute.
pub fn row_constraint_value(row: &Row, attribute: &Attribute) -> Value {
    row.get(attribute.column()).cloned().unwrap_or(Value::Null)
}

pub fn row_internal_id(row: &Row) -> Option<i64> {
    row.get(INTERNAL_ID_COLUMN).and_then(Value::as_i64)
}

pub fn row_count(row: &Row) -> u64 {
    row.get(COUNT_COLUMN).and_then(Value::as_u64).unwrap_or(0)
}

/// A placeholder in the query graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub label: String,
    /// Query variable name; empty for `VALUE` nodes
    pub internal_label: String,
    pub parent: Option<NodeId>,
    pub parent_rel: Option<String>,
    /// Relation from the parent is traversed against its direction
    pub is_parent_rel_reverse: bool,
    pub relationships: Vec<RelationshipSegment>,
    pub relationships_loaded: bool,
    /// Selected values
    pub value: Vec<SelectedValue>,
    /// Candidate rows from the last value fetch
    pub data: Option<Vec<Row>>,
    /// 1-indexed page into `data`
    pub page: usize,
    pub count: u64,
    pub value_expanded: bool,
    pub is_negative: bool,
    pub is_auto_load_value: bool,
    pub immutable: bool,
    pub fixed: bool,
    pub position: Option<Position>,
    /// Row of a `VALUE` node
    pub attributes: Option<Row>,
    /// Opaque identifier of a `VALUE` node's row
    pub internal_id: Option<i64>,
}

impl Node {
    pub(crate) fn new(id: NodeId, node_type: NodeType, label: &str, internal_label: String) -> Self {
        Self {
            id,
            node_type,
            label: label.to_string(),
            internal_label,
            parent: None,
            parent_rel: None,
            is_parent_rel_reverse: false,
            relationships: vec![],
            relationships_loaded: false,
            value: vec![],
            data: None,
            page: 1,
            count: 0,
            value_expanded: false,
            is_negative: false,
            is_auto_load_value: false,
            immutable: false,
            fixed: false,
            position: None,
            attributes: None,
            internal_id: None,
        }
    }

    /// True when at least one value is selected.
    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    /// Nodes that get a count statement.
    pub fn is_countable(&self) -> bool {
        matches!(self.node_type, NodeType::Root | NodeType::Choose) && !self.is_negative
    }
}

/// An edge of the query graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub link_type: LinkType,
    pub source: NodeId,
    pub target: NodeId,
    /// Relation type name (empty for value links)
    pub label: String,
}
