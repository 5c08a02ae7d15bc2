//! Statement compiler.
//!
//! Every statement kind funnels through [`relevant_links`] (or
//! [`links_to_root`] for discovery) and [`generate_query_elements`], then
//! through the label's rewrite hook, and finally gets the configured prefix.

use std::sync::Arc;

use tracing::debug;

use crate::model::{GraphError, Node, NodeId, QueryGraph};
use crate::provider::LabelProvider;

use super::elements::{generate_query_elements, node_value_constraints, QueryElements};
use super::relevance::{links_to_root, relevant_links};
use super::{
    CompiledStatement, QueryConfig, StatementParts, COUNT_COLUMN, INCOMING_RELS_COLUMN,
};

/// Variable bound to discovered relations in relation queries.
pub const RELATION_VARIABLE: &str = "r";
/// Variable bound to discovered relation targets in relation queries.
pub const RELATION_TARGET_VARIABLE: &str = "x";
/// Variable used by taxonomy count queries.
const TAXONOMY_VARIABLE: &str = "n";

/// Compiles a query graph into parameterized statements.
#[derive(Clone)]
pub struct QueryCompiler {
    provider: Arc<dyn LabelProvider>,
    config: QueryConfig,
}

impl QueryCompiler {
    pub fn new(provider: Arc<dyn LabelProvider>, config: QueryConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn LabelProvider> {
        &self.provider
    }

    fn elements(
        &self,
        graph: &QueryGraph,
        target: NodeId,
        constraints_needed: bool,
    ) -> Result<QueryElements, GraphError> {
        let links = relevant_links(graph, target);
        generate_query_elements(
            graph,
            self.provider.as_ref(),
            &self.config,
            target,
            &links,
            constraints_needed,
        )
    }

    fn parts(elements: QueryElements) -> StatementParts {
        StatementParts {
            match_elements: elements.match_elements,
            where_elements: elements.where_elements,
            parameters: elements.parameters,
            ..Default::default()
        }
    }

    /// Add the target's own value constraint.
    fn constrain_target(&self, node: &Node, parts: &mut StatementParts) {
        let attribute = self.provider.constraint_attribute(&node.label);
        let (predicate, parameters) = node_value_constraints(node, &attribute);
        parts.where_elements.extend(predicate);
        parts.parameters.extend(parameters);
    }

    // ========================================================================
    // Result query
    // ========================================================================

    /// Rows returned for the root.
    ///
    /// Flat mode returns the root's return attributes; graph mode returns the
    /// root variable and every matched relation.
    pub fn result_query(
        &self,
        graph: &QueryGraph,
        graph_mode: bool,
    ) -> Result<CompiledStatement, GraphError> {
        let root = graph.root().ok_or(GraphError::EmptyGraph)?;
        let elements = self.elements(graph, root.id, true)?;
        let relations = elements.relation_elements.clone();

        let mut parts = Self::parts(elements);
        self.constrain_target(root, &mut parts);
        parts.distinct = true;

        if graph_mode {
            parts.return_elements.push(root.internal_label.clone());
            parts.return_elements.extend(relations);
        } else {
            parts.return_elements = self
                .provider
                .return_attributes(&root.label)
                .iter()
                .map(|a| a.return_element(&root.internal_label))
                .collect();
        }

        if let Some(order) = self.result_order(root, graph_mode) {
            parts.end_elements.push(order);
        }
        parts
            .end_elements
            .push(format!("LIMIT {}", self.config.max_results_count));

        let parts = self.provider.filter_result_query(root, parts);
        Ok(parts.compile(&self.config.statement_prefix))
    }

    fn result_order(&self, root: &Node, graph_mode: bool) -> Option<String> {
        let attributes = self.provider.result_order_by_attributes(&root.label);
        if attributes.is_empty() {
            return None;
        }
        let ascending = self.provider.result_order_ascending(&root.label);

        let terms: Vec<String> = attributes
            .iter()
            .enumerate()
            .map(|(i, attribute)| {
                let asc = ascending
                    .get(i)
                    .or_else(|| ascending.last())
                    .copied()
                    .unwrap_or(true);
                let column = if graph_mode {
                    format!("{}.{}", root.internal_label, attribute)
                } else {
                    attribute.clone()
                };
                format!("{} {}", column, direction(asc))
            })
            .collect();
        Some(format!("ORDER BY {}", terms.join(", ")))
    }

    // ========================================================================
    // Node queries
    // ========================================================================

    /// Distinct count of `id` under every constraint in the graph.
    pub fn node_count_query(
        &self,
        graph: &QueryGraph,
        id: NodeId,
    ) -> Result<CompiledStatement, GraphError> {
        let node = graph.require(id)?;
        let elements = self.elements(graph, id, true)?;

        let mut parts = Self::parts(elements);
        self.constrain_target(node, &mut parts);
        let attribute = self.provider.constraint_attribute(&node.label);
        parts.return_elements.push(format!(
            "count(DISTINCT {}) AS {}",
            attribute.expression(&node.internal_label),
            COUNT_COLUMN
        ));

        let parts = self.provider.filter_node_count_query(node, parts);
        Ok(parts.compile(&self.config.statement_prefix))
    }

    /// Candidate values of `id`, each with the number of matching roots.
    ///
    /// The node itself stays unconstrained; already selected values are
    /// filtered by the caller.
    pub fn node_value_query(
        &self,
        graph: &QueryGraph,
        id: NodeId,
    ) -> Result<CompiledStatement, GraphError> {
        let node = graph.require(id)?;
        let root = graph.root().ok_or(GraphError::EmptyGraph)?;
        let elements = self.elements(graph, id, true)?;
        let relations = elements.relation_elements.clone();

        let mut parts = Self::parts(elements);

        let mut attributes = self.provider.return_attributes(&node.label);
        let constraint = self.provider.constraint_attribute(&node.label);
        if !attributes.contains(&constraint) {
            attributes.push(constraint);
        }
        parts.return_elements = attributes
            .iter()
            .map(|a| a.return_element(&node.internal_label))
            .collect();
        parts.return_elements.push(format!(
            "count({}) AS {}",
            root.internal_label, COUNT_COLUMN
        ));

        if self.config.collect_relations_with_values && !relations.is_empty() {
            let collected = match relations.as_slice() {
                [single] => single.clone(),
                many => format!("[{}]", many.join(", ")),
            };
            parts
                .return_elements
                .push(format!("COLLECT({}) AS {}", collected, INCOMING_RELS_COLUMN));
        }

        if let Some(order_by) = self.provider.value_order_by_attribute(&node.label) {
            let asc = self.provider.is_value_order_ascending(&node.label);
            parts
                .end_elements
                .push(format!("ORDER BY {} {}", order_by, direction(asc)));
        }
        parts
            .end_elements
            .push(format!("LIMIT {}", self.config.value_query_limit));

        let parts = self.provider.filter_node_value_query(node, parts);
        Ok(parts.compile(&self.config.statement_prefix))
    }

    /// Outgoing relation types and target labels reachable from `id`.
    ///
    /// Only the path from the root is matched; value constraints elsewhere in
    /// the graph would hide reachable relations.
    pub fn node_relation_query(
        &self,
        graph: &QueryGraph,
        id: NodeId,
    ) -> Result<CompiledStatement, GraphError> {
        let node = graph.require(id)?;
        let links = links_to_root(graph, id);
        let elements = generate_query_elements(
            graph,
            self.provider.as_ref(),
            &self.config,
            id,
            &links,
            false,
        )?;

        let mut parts = Self::parts(elements);
        let source = if links.is_empty() {
            // the root's bare pattern folds into the discovery pattern
            parts.match_elements.clear();
            format!("({}:`{}`)", node.internal_label, node.label)
        } else {
            format!("({})", node.internal_label)
        };
        parts.match_elements.push(format!(
            "{}-[{}]->({})",
            source, RELATION_VARIABLE, RELATION_TARGET_VARIABLE
        ));

        parts.return_elements = vec![
            format!("type({}) AS label", RELATION_VARIABLE),
            format!(
                "{}(labels({})) AS target",
                self.config.relation_target_label.function(),
                RELATION_TARGET_VARIABLE
            ),
            format!("count({}) AS {}", RELATION_VARIABLE, COUNT_COLUMN),
        ];
        parts
            .end_elements
            .push(format!("ORDER BY count({}) DESC", RELATION_VARIABLE));

        debug!("Compiled relation discovery for {}", id);
        let parts = self.provider.filter_node_relation_query(node, parts);
        Ok(parts.compile(&self.config.statement_prefix))
    }

    // ========================================================================
    // Taxonomy
    // ========================================================================

    /// Instance count of `label`, honouring only its predefined constraints.
    pub fn taxonomy_count_query(&self, label: &str) -> CompiledStatement {
        let attribute = self.provider.constraint_attribute(label);
        let where_elements = self
            .provider
            .predefined_constraints(label)
            .iter()
            .map(|c| c.replace(super::elements::IDENTIFIER_PLACEHOLDER, TAXONOMY_VARIABLE))
            .collect();

        StatementParts {
            match_elements: vec![format!("({}:`{}`)", TAXONOMY_VARIABLE, label)],
            where_elements,
            return_elements: vec![format!(
                "count(DISTINCT {}) AS {}",
                attribute.expression(TAXONOMY_VARIABLE),
                COUNT_COLUMN
            )],
            ..Default::default()
        }
        .compile(&self.config.statement_prefix)
    }
}

fn direction(ascending: bool) -> &'static str {
    if ascending {
        "ASC"
    } else {
        "DESC"
    }
}
