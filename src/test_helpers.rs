//! Test helper factories and graph builders
//!
//! Provides a provider configuration covering the label shapes the tests
//! need, graph builders, row factories and a structural invariant check.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{
    LinkType, Node, NodeId, NodeType, QueryGraph, RelationshipSegment, Row, DEFAULT_PAGE_SIZE,
};
use crate::provider::{ConfigProvider, LabelProvider, ProviderConfig};
use crate::query::{QueryCompiler, QueryConfig};

// ============================================================================
// Provider
// ============================================================================

/// Labels used across the tests:
/// - `Person`: constrained and returned by `name`, auto-loads its values
/// - `Movie`: constrained by `title`, returns `title` and `released`
/// - `Team`: immutable, predefined `active` constraint, static schema
/// - anything else: defaults (internal id)
const PROVIDER_YAML: &str = r#"
default_label:
  return_attributes:
    - internal_id
labels:
  Person:
    constraint_attribute:
      property: name
    return_attributes:
      - property: name
    auto_load_value: true
  Movie:
    constraint_attribute:
      property: title
    return_attributes:
      - property: title
      - property: released
  Team:
    constraint_attribute:
      property: name
    predefined_constraints:
      - "$identifier.active = true"
    immutable: true
    schema:
      label: Team
      rel:
        - label: HAS_MEMBER
          target:
            label: Person
"#;

pub fn test_provider_config() -> ProviderConfig {
    serde_yaml::from_str(PROVIDER_YAML).expect("test provider config")
}

pub fn test_provider() -> Arc<dyn LabelProvider> {
    Arc::new(ConfigProvider::new(test_provider_config()))
}

pub fn test_compiler() -> QueryCompiler {
    QueryCompiler::new(test_provider(), QueryConfig::default())
}

// ============================================================================
// Graph builders
// ============================================================================

/// A detached query node, for provider hook tests.
pub fn query_node(label: &str, internal_label: &str) -> Node {
    Node::new(NodeId(0), NodeType::Choose, label, internal_label.to_string())
}

/// `Person` root with `FOLLOWS`, `LIKES` (both to `Person`) and `ACTED_IN`
/// segments loaded.
pub fn people_graph() -> (QueryGraph, NodeId) {
    let mut graph = QueryGraph::new(test_provider(), DEFAULT_PAGE_SIZE);
    let root = graph.add_root("Person", None);
    graph
        .set_relationships(
            root,
            vec![
                RelationshipSegment::new("FOLLOWS", "Person", 3),
                RelationshipSegment::new("LIKES", "Person", 2),
                RelationshipSegment::new("ACTED_IN", "Movie", 5),
            ],
        )
        .expect("root exists");
    (graph, root)
}

/// Select `row` on `node` as a user would: fetch, expand, click.
/// Returns the id of the selected value.
pub fn select_row(graph: &mut QueryGraph, node: NodeId, row: Row) -> NodeId {
    graph.set_data(node, vec![row]).expect("node exists");
    graph.expand_values(node).expect("node exists");
    let value = graph.value_nodes(node)[0].id;
    graph.select_value(value).expect("value node");
    value
}

// ============================================================================
// Rows
// ============================================================================

pub fn row(fields: &[(&str, &str)]) -> Row {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

/// `n` candidate rows `{name: "person-i", count: n - i}`.
pub fn name_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            let name = format!("person-{}", i);
            let mut row = row(&[("name", name.as_str())]);
            row.insert("count".into(), Value::from((n - i) as u64));
            row
        })
        .collect()
}

/// Relation discovery rows `{label, target, count}`.
pub fn relation_rows(relations: &[(&str, &str, u64)]) -> Vec<Row> {
    relations
        .iter()
        .map(|(label, target, count)| {
            let mut row = row(&[("label", *label), ("target", *target)]);
            row.insert("count".into(), Value::from(*count));
            row
        })
        .collect()
}

// ============================================================================
// Invariants
// ============================================================================

/// Check the structural invariants of a query graph:
/// - `nodes[0]` is the only `ROOT`
/// - every other query node has exactly one incoming `RELATION` link and
///   reaches the root through its parents
/// - every `VALUE` node hangs off exactly one `VALUE` link
/// - link endpoints exist and internal labels are unique
pub fn assert_tree_invariant(graph: &QueryGraph) {
    let nodes = graph.nodes();
    if nodes.is_empty() {
        assert!(graph.links().is_empty(), "links without nodes");
        return;
    }

    assert_eq!(nodes[0].node_type, NodeType::Root, "nodes[0] must be the root");
    assert_eq!(
        nodes.iter().filter(|n| n.is_root()).count(),
        1,
        "exactly one root"
    );

    let ids: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
    for link in graph.links() {
        assert!(ids.contains(&link.source), "dangling source in {:?}", link);
        assert!(ids.contains(&link.target), "dangling target in {:?}", link);
    }

    let mut labels = HashSet::new();
    for node in nodes.iter().skip(1) {
        let incoming: Vec<_> = graph
            .links()
            .iter()
            .filter(|l| l.target == node.id)
            .collect();
        assert_eq!(incoming.len(), 1, "{} must have one parent link", node.id);

        let expected = if node.node_type == NodeType::Value {
            LinkType::Value
        } else {
            LinkType::Relation
        };
        assert_eq!(incoming[0].link_type, expected);
        assert_eq!(Some(incoming[0].source), node.parent);

        if node.node_type != NodeType::Value {
            assert!(
                labels.insert(node.internal_label.clone()),
                "internal label {} reused",
                node.internal_label
            );
            let mut steps = 0;
            let mut current = node.parent;
            while let Some(id) = current {
                steps += 1;
                assert!(steps <= nodes.len(), "cycle through {}", node.id);
                current = graph.node(id).and_then(|n| n.parent);
            }
        }
    }
    assert!(
        !labels.contains(&nodes[0].internal_label),
        "root label reused"
    );
}
