//! Query graph: node/link collections and their structural mutations.
//!
//! The `RELATION` links form a tree rooted at `nodes[0]`. Every mutation
//! keeps that invariant: subtrees are created one child at a time and are
//! always destroyed as a whole.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::provider::LabelProvider;

use super::labels::InternalLabels;
use super::{
    row_count, row_internal_id, GraphError, Link, LinkId, LinkType, Node, NodeId, NodeType,
    Position, RelationshipSegment, Row, SchemaNode, SelectedValue,
};

/// Number of value nodes shown per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// The user's query under construction.
pub struct QueryGraph {
    nodes: Vec<Node>,
    links: Vec<Link>,
    labels: InternalLabels,
    next_node_id: u64,
    next_link_id: u64,
    page_size: usize,
    provider: Arc<dyn LabelProvider>,
}

impl QueryGraph {
    pub fn new(provider: Arc<dyn LabelProvider>, page_size: usize) -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            labels: InternalLabels::new(),
            next_node_id: 0,
            next_link_id: 0,
            page_size: page_size.max(1),
            provider,
        }
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn require(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.node(id).ok_or(GraphError::NodeNotFound(id))
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.node_mut(id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.first().filter(|n| n.is_root())
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root().map(|n| n.id)
    }

    pub fn relation_links(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(|l| l.link_type == LinkType::Relation)
    }

    /// The single `RELATION` link pointing at `id` (none for the root).
    pub fn incoming_relation(&self, id: NodeId) -> Option<&Link> {
        self.relation_links().find(|l| l.target == id)
    }

    /// Children reached through `RELATION` links, in link order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.relation_links()
            .filter(|l| l.source == id)
            .map(|l| l.target)
            .collect()
    }

    /// Value nodes currently expanded under `id`.
    pub fn value_nodes(&self, id: NodeId) -> Vec<&Node> {
        self.links
            .iter()
            .filter(|l| l.link_type == LinkType::Value && l.source == id)
            .filter_map(|l| self.node(l.target))
            .collect()
    }

    /// Whether `ancestor` lies on the parent chain of `node` (or is `node`).
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Drop every node and link and reset the internal-label table.
    ///
    /// Node ids keep counting so stale responses can never match new nodes.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.labels.clear();
    }

    /// Create the `ROOT` node, pinned at `anchor`.
    ///
    /// A non-empty graph is reset first, with a warning.
    pub fn add_root(&mut self, label: &str, anchor: Option<Position>) -> NodeId {
        if !self.is_empty() {
            warn!(
                "add_root(`{}`) called on a non-empty graph, resetting it",
                label
            );
            self.clear();
        }

        let id = self.create_query_node(NodeType::Root, label);
        if let Some(root) = self.node_mut(id) {
            root.fixed = true;
            root.position = anchor;
        }
        id
    }

    /// Build a whole graph from a static schema.
    pub fn add_from_schema(&mut self, schema: &SchemaNode, anchor: Option<Position>) -> NodeId {
        let root = self.add_root(&schema.label, anchor);
        self.apply_schema(root, schema);
        root
    }

    fn apply_schema(&mut self, id: NodeId, schema: &SchemaNode) {
        let values: Vec<SelectedValue> = schema
            .value
            .iter()
            .map(|row| SelectedValue {
                id: self.allocate_node_id(),
                label: schema.label.clone(),
                attributes: row.clone(),
                internal_id: row_internal_id(row),
                count: row_count(row),
            })
            .collect();

        let segments = schema.segments();
        if let Some(node) = self.node_mut(id) {
            node.value = values;
            node.relationships = segments.clone();
            node.relationships_loaded = true;
        }

        for (segment, rel) in segments.iter().zip(&schema.rel) {
            let node_type = if rel.target.group {
                NodeType::Group
            } else {
                NodeType::Choose
            };
            let child = self.attach_child(id, segment, node_type);
            self.apply_schema(child, &rel.target);
        }
    }

    /// Create a `CHOOSE` child of `node` for one of its relationship segments.
    pub fn expand_relationship(
        &mut self,
        node: NodeId,
        segment_index: usize,
    ) -> Result<NodeId, GraphError> {
        let segment = self
            .require(node)?
            .relationships
            .get(segment_index)
            .cloned()
            .ok_or(GraphError::SegmentNotFound {
                node,
                index: segment_index,
            })?;
        Ok(self.attach_child(node, &segment, NodeType::Choose))
    }

    /// Replace a node's relationship segments.
    pub fn set_relationships(
        &mut self,
        id: NodeId,
        mut segments: Vec<RelationshipSegment>,
    ) -> Result<(), GraphError> {
        RelationshipSegment::layout(&mut segments);
        let node = self.require_mut(id)?;
        node.relationships = segments;
        node.relationships_loaded = true;
        Ok(())
    }

    fn attach_child(
        &mut self,
        parent: NodeId,
        segment: &RelationshipSegment,
        node_type: NodeType,
    ) -> NodeId {
        let id = self.create_query_node(node_type, &segment.target);
        if let Some(child) = self.node_mut(id) {
            child.parent = Some(parent);
            child.parent_rel = Some(segment.label.clone());
            child.is_parent_rel_reverse = segment.is_reverse;
        }
        let link_id = self.allocate_link_id();
        self.links.push(Link {
            id: link_id,
            link_type: LinkType::Relation,
            source: parent,
            target: id,
            label: segment.label.clone(),
        });
        id
    }

    fn create_query_node(&mut self, node_type: NodeType, label: &str) -> NodeId {
        let id = self.allocate_node_id();
        let internal_label = self.labels.generate(label);
        let mut node = Node::new(id, node_type, label, internal_label);
        node.is_auto_load_value = self.provider.is_auto_load_value(label);
        node.immutable = self.provider.is_immutable(label);
        self.nodes.push(node);
        id
    }

    fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn allocate_link_id(&mut self) -> LinkId {
        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        id
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Store freshly fetched candidate rows, restarting at the first page.
    pub fn set_data(&mut self, id: NodeId, rows: Vec<Row>) -> Result<(), GraphError> {
        let node = self.require_mut(id)?;
        node.data = Some(rows);
        node.page = 1;
        Ok(())
    }

    /// Materialize the current page of `data` as `VALUE` nodes.
    ///
    /// No-op when the node has never been fetched. Returns the number of
    /// value nodes created.
    pub fn expand_values(&mut self, id: NodeId) -> Result<usize, GraphError> {
        if self.require(id)?.value_expanded {
            self.collapse_values(id)?;
        }

        let node = self.require(id)?;
        let Some(data) = node.data.as_ref() else {
            debug!("expand_values on {} before any value fetch", id);
            return Ok(0);
        };
        let start = (node.page.max(1) - 1) * self.page_size;
        let rows: Vec<Row> = data
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        let label = node.label.clone();
        let parent = node.parent;

        let created = rows.len();
        for row in rows {
            let value_id = self.allocate_node_id();
            let mut value = Node::new(value_id, NodeType::Value, &label, String::new());
            value.parent = Some(id);
            value.internal_id = row_internal_id(&row);
            value.count = row_count(&row);
            value.attributes = Some(row);
            self.nodes.push(value);

            let link_id = self.allocate_link_id();
            self.links.push(Link {
                id: link_id,
                link_type: LinkType::Value,
                source: id,
                target: value_id,
                label: String::new(),
            });
        }

        let node = self.require_mut(id)?;
        node.fixed = true;
        node.value_expanded = true;
        self.set_pinned(parent, true);
        Ok(created)
    }

    /// Remove every value node under `id` and unpin it.
    pub fn collapse_values(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.require(id)?;
        if !node.value_expanded {
            debug!("collapse_values on {} which is not expanded", id);
            return Ok(());
        }
        let parent = node.parent;

        let value_ids: HashSet<NodeId> = self
            .links
            .iter()
            .filter(|l| l.link_type == LinkType::Value && l.source == id)
            .map(|l| l.target)
            .collect();
        self.links
            .retain(|l| !(l.link_type == LinkType::Value && l.source == id));
        self.nodes.retain(|n| !value_ids.contains(&n.id));

        let node = self.require_mut(id)?;
        node.value_expanded = false;
        if !node.is_root() {
            node.fixed = false;
        }
        self.set_pinned(parent, false);
        Ok(())
    }

    /// Pin or unpin a parent, leaving the root pinned.
    fn set_pinned(&mut self, id: Option<NodeId>, fixed: bool) {
        if let Some(parent) = id.and_then(|id| self.node_mut(id)) {
            if !parent.is_root() {
                parent.fixed = fixed;
            }
        }
    }

    /// Move a value node into its parent's selected values and collapse the parent.
    ///
    /// Returns the parent's id.
    pub fn select_value(&mut self, value_node: NodeId) -> Result<NodeId, GraphError> {
        let node = self.require(value_node)?;
        if node.node_type != NodeType::Value {
            return Err(GraphError::NotAValueNode(value_node));
        }
        let parent = node.parent.ok_or(GraphError::NotAValueNode(value_node))?;
        let selected = SelectedValue {
            id: node.id,
            label: node.label.clone(),
            attributes: node.attributes.clone().unwrap_or_default(),
            internal_id: node.internal_id,
            count: node.count,
        };

        self.require_mut(parent)?.value.push(selected);
        self.collapse_values(parent)?;
        Ok(parent)
    }

    /// Unselect one value. Returns whether it was selected.
    ///
    /// A negated node left without values becomes a bare negation and loses
    /// its subtree, exactly as if it had been negated empty.
    pub fn remove_value(&mut self, id: NodeId, value: NodeId) -> Result<bool, GraphError> {
        let node = self.require_mut(id)?;
        let before = node.value.len();
        node.value.retain(|v| v.id != value);
        if node.value.len() == before {
            return Ok(false);
        }

        if node.is_negative && !node.has_value() {
            self.prune_negated(id)?;
        }
        Ok(true)
    }

    /// Toggle negation of a `CHOOSE` node.
    ///
    /// Negating a node without values removes its whole subtree and zeroes
    /// its count. Returns whether the query changed.
    pub fn negate(&mut self, id: NodeId) -> Result<bool, GraphError> {
        let node = self.require(id)?;
        if node.node_type != NodeType::Choose {
            warn!("Only choose nodes can be negated, ignoring {}", id);
            return Ok(false);
        }

        if node.is_negative {
            self.require_mut(id)?.is_negative = false;
            return Ok(true);
        }

        if !node.has_value() {
            self.prune_negated(id)?;
        }
        self.require_mut(id)?.is_negative = true;
        Ok(true)
    }

    /// Drop what a bare negation can no longer constrain.
    fn prune_negated(&mut self, id: NodeId) -> Result<(), GraphError> {
        for child in self.children(id) {
            self.remove_subtree(child);
        }
        self.collapse_values(id)?;
        self.require_mut(id)?.count = 0;
        Ok(())
    }

    /// Remove a node with all its descendants.
    ///
    /// Returns whether any removed node held a value or a negation, i.e.
    /// whether results (not just counts) must be recomputed. Removing the
    /// root clears the graph.
    pub fn remove_node(&mut self, id: NodeId) -> Result<bool, GraphError> {
        if self.require(id)?.is_root() {
            warn!("Removing root {} clears the whole graph", id);
            let held = self.nodes.iter().any(|n| n.has_value() || n.is_negative);
            self.clear();
            return Ok(held);
        }
        Ok(self.remove_subtree(id))
    }

    fn remove_subtree(&mut self, id: NodeId) -> bool {
        let mut doomed = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if doomed.insert(current) {
                stack.extend(
                    self.links
                        .iter()
                        .filter(|l| l.source == current)
                        .map(|l| l.target),
                );
            }
        }

        let held = self
            .nodes
            .iter()
            .filter(|n| doomed.contains(&n.id))
            .any(|n| n.has_value() || n.is_negative);
        self.links
            .retain(|l| !doomed.contains(&l.source) && !doomed.contains(&l.target));
        self.nodes.retain(|n| !doomed.contains(&n.id));
        held
    }

    // ========================================================================
    // Pagination
    // ========================================================================

    /// `data` from the last fetch is authoritative, not the relation count.
    pub fn has_next_page(&self, id: NodeId) -> bool {
        self.node(id)
            .and_then(|n| n.data.as_ref().map(|data| n.page * self.page_size < data.len()))
            .unwrap_or(false)
    }

    pub fn has_previous_page(&self, id: NodeId) -> bool {
        self.node(id).map(|n| n.page > 1).unwrap_or(false)
    }

    pub fn next_page(&mut self, id: NodeId) -> Result<bool, GraphError> {
        if !self.has_next_page(id) {
            return Ok(false);
        }
        self.require_mut(id)?.page += 1;
        self.expand_values(id)?;
        Ok(true)
    }

    pub fn previous_page(&mut self, id: NodeId) -> Result<bool, GraphError> {
        if !self.has_previous_page(id) {
            return Ok(false);
        }
        self.require_mut(id)?.page -= 1;
        self.expand_values(id)?;
        Ok(true)
    }
}
