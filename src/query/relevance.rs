//! Relevance & path resolution.
//!
//! Picks the `RELATION` links a statement about `target` must mention and
//! rebuilds root-to-node paths for relation discovery.

use std::collections::HashSet;

use crate::model::{Link, LinkId, NodeId, QueryGraph};

/// Whether negation of `negated` shapes statements about `target`.
///
/// A statement about the negated node itself, or about anything beneath it,
/// must match that node positively to reach its target.
pub fn negation_applies(graph: &QueryGraph, negated: NodeId, target: NodeId) -> bool {
    !graph.is_ancestor_or_self(negated, target)
}

/// True when some strict ancestor of `node` is a negated node whose negation
/// applies. Such links are folded into the ancestor's `NOT` clause.
fn under_applied_negation(graph: &QueryGraph, node: NodeId, target: NodeId) -> bool {
    let mut current = graph.node(node).and_then(|n| n.parent);
    while let Some(id) = current {
        let Some(ancestor) = graph.node(id) else {
            return false;
        };
        if ancestor.is_negative && negation_applies(graph, id, target) {
            return true;
        }
        current = ancestor.parent;
    }
    false
}

/// Links a statement about `target` must include.
///
/// Leaf links (targets holding a value, negated, or the target itself) come
/// first in link order, followed by the path links connecting them to the
/// root, each once.
pub fn relevant_links(graph: &QueryGraph, target: NodeId) -> Vec<&Link> {
    let Some(root) = graph.root_id() else {
        return vec![];
    };

    let leaves: Vec<&Link> = graph
        .relation_links()
        .filter(|link| {
            graph.node(link.target).is_some_and(|node| {
                node.has_value() || node.is_negative || node.id == target
            })
        })
        .filter(|link| !under_applied_negation(graph, link.target, target))
        .collect();

    let mut seen: HashSet<LinkId> = leaves.iter().map(|l| l.id).collect();
    let mut relevant = leaves.clone();

    for leaf in &leaves {
        let mut current = leaf.source;
        while current != root {
            let Some(incoming) = graph.incoming_relation(current) else {
                break;
            };
            if seen.insert(incoming.id) {
                relevant.push(incoming);
            }
            current = incoming.source;
        }
    }
    relevant
}

/// Incoming `RELATION` links from the root down to `node`, root first.
pub fn links_to_root(graph: &QueryGraph, node: NodeId) -> Vec<&Link> {
    let mut links = Vec::new();
    let mut current = node;
    while let Some(incoming) = graph.incoming_relation(current) {
        links.push(incoming);
        current = incoming.source;
    }
    links.reverse();
    links
}
