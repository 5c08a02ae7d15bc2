//! LabelProvider trait definition
//!
//! Per-label configuration consulted by the graph model and the compiler.
//! Pure lookups: implementations never mutate the query graph.

use crate::model::{Node, SchemaNode};
use crate::query::StatementParts;

use super::Attribute;

/// Read-only capability interface describing how each label is queried.
///
/// The `filter_*` hooks receive the assembled statement structure of the
/// matching statement kind and may rewrite it before it is serialized.
/// They default to the identity.
pub trait LabelProvider: Send + Sync {
    /// Attribute used to bind selected values to WHERE predicates.
    fn constraint_attribute(&self, label: &str) -> Attribute;

    /// Attributes returned by result and value queries.
    fn return_attributes(&self, label: &str) -> Vec<Attribute>;

    /// Raw predicates always applied to nodes of this label.
    /// `$identifier` is replaced by the node's query variable.
    fn predefined_constraints(&self, label: &str) -> Vec<String>;

    /// Column used to order candidate values, if any.
    fn value_order_by_attribute(&self, label: &str) -> Option<String>;

    fn is_value_order_ascending(&self, label: &str) -> bool;

    /// Columns used to order results.
    fn result_order_by_attributes(&self, label: &str) -> Vec<String>;

    /// Sort direction per result order column; the last entry repeats.
    fn result_order_ascending(&self, label: &str) -> Vec<bool>;

    /// Whether candidate values are prefetched whenever the tree changes.
    fn is_auto_load_value(&self, label: &str) -> bool;

    /// Whether every discovered relation is expanded automatically.
    fn is_auto_expand_relations(&self, label: &str) -> bool;

    /// Whether nodes of this label always carry their value constraint and
    /// refuse value selection.
    fn is_immutable(&self, label: &str) -> bool;

    /// Static relation schema, when relation discovery is not needed.
    fn schema(&self, label: &str) -> Option<SchemaNode>;

    fn filter_result_query(&self, _node: &Node, parts: StatementParts) -> StatementParts {
        parts
    }

    fn filter_node_value_query(&self, _node: &Node, parts: StatementParts) -> StatementParts {
        parts
    }

    fn filter_node_count_query(&self, _node: &Node, parts: StatementParts) -> StatementParts {
        parts
    }

    fn filter_node_relation_query(&self, _node: &Node, parts: StatementParts) -> StatementParts {
        parts
    }
}
