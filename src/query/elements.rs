//! MATCH / WHERE fragment generation.

use std::collections::HashSet;

use crate::model::{GraphError, Link, Node, NodeId, QueryGraph};
use crate::provider::{Attribute, LabelProvider};

use super::relevance::negation_applies;
use super::{Parameters, QueryConfig};

/// Placeholder replaced by a node's variable in predefined constraints.
pub const IDENTIFIER_PLACEHOLDER: &str = "$identifier";

/// Clauses generated from a set of relevant links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryElements {
    pub match_elements: Vec<String>,
    pub where_elements: Vec<String>,
    /// Identifiers of matched relations (`r0`, `r1`, …)
    pub relation_elements: Vec<String>,
    pub parameters: Parameters,
}

/// `(variable:`Label`)`
pub fn node_pattern(node: &Node) -> String {
    format!("({}:`{}`)", node.internal_label, node.label)
}

/// Base parameter name of a node's constraint: `<internalLabel>_<attribute>`.
pub fn parameter_name(node: &Node, attribute: &Attribute) -> String {
    format!("{}_{}", node.internal_label, attribute.parameter_suffix())
}

/// Name of the parameter bound to the `index`-th selected value of a
/// negated node: `base`, `base2`, `base3`, ….
pub fn value_parameter_name(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{}{}", base, index + 1)
    }
}

/// WHERE predicate and parameters constraining `node` to its selected values.
///
/// Negated nodes only bind one scalar per value; their predicates are
/// emitted as `NOT` clauses on the incoming link.
pub fn node_value_constraints(node: &Node, attribute: &Attribute) -> (Option<String>, Parameters) {
    let mut parameters = Parameters::new();
    let base = parameter_name(node, attribute);

    if node.is_negative {
        for (index, value) in node.value.iter().enumerate() {
            parameters.insert(
                value_parameter_name(&base, index),
                value.constraint_value(attribute),
            );
        }
        return (None, parameters);
    }

    let expression = attribute.expression(&node.internal_label);
    let predicate = match node.value.as_slice() {
        [] => None,
        [single] => {
            parameters.insert(base.clone(), single.constraint_value(attribute));
            Some(format!("{} = ${}", expression, base))
        }
        values => {
            let list = values
                .iter()
                .map(|v| v.constraint_value(attribute))
                .collect::<Vec<_>>();
            parameters.insert(base.clone(), serde_json::Value::Array(list));
            Some(format!("{} IN ${}", expression, base))
        }
    };
    (predicate, parameters)
}

/// Predefined constraints of `node` with `$identifier` substituted.
pub fn predefined_constraints(node: &Node, provider: &dyn LabelProvider) -> Vec<String> {
    provider
        .predefined_constraints(&node.label)
        .iter()
        .map(|c| c.replace(IDENTIFIER_PLACEHOLDER, &node.internal_label))
        .collect()
}

/// Accumulates clauses while walking the links.
struct Builder<'a> {
    provider: &'a dyn LabelProvider,
    target: NodeId,
    constraints_needed: bool,
    elements: QueryElements,
    predefined_done: HashSet<NodeId>,
    values_done: HashSet<NodeId>,
}

impl Builder<'_> {
    fn add_predefined(&mut self, node: &Node) {
        if self.predefined_done.insert(node.id) {
            let constraints = predefined_constraints(node, self.provider);
            self.elements.where_elements.extend(constraints);
        }
    }

    fn add_value_constraints(&mut self, node: &Node) {
        if node.id == self.target || !(self.constraints_needed || node.immutable) {
            return;
        }
        if !self.values_done.insert(node.id) {
            return;
        }
        let attribute = self.provider.constraint_attribute(&node.label);
        let (predicate, parameters) = node_value_constraints(node, &attribute);
        self.elements.where_elements.extend(predicate);
        self.elements.parameters.extend(parameters);
    }

    fn add_relation(&mut self, source: &Node, link: &Link, target: &Node, arrow: &str) {
        let identifier = format!("r{}", self.elements.relation_elements.len());
        self.elements.match_elements.push(format!(
            "{}-[{}:`{}`]{}{}",
            node_pattern(source),
            identifier,
            link.label,
            arrow,
            node_pattern(target)
        ));
        self.elements.relation_elements.push(identifier);
    }

    fn add_negation(&mut self, source: &Node, link: &Link, target: &Node, arrow: &str) {
        let relation = format!("({})-[:`{}`]{}", source.internal_label, link.label, arrow);

        if !target.has_value() {
            self.elements
                .where_elements
                .push(format!("NOT {}(:`{}`)", relation, target.label));
            return;
        }

        let attribute = self.provider.constraint_attribute(&target.label);
        let base = parameter_name(target, &attribute);
        for (index, value) in target.value.iter().enumerate() {
            let parameter = value_parameter_name(&base, index);
            let clause = match &attribute {
                Attribute::InternalId => format!(
                    "NOT EXISTS {{ MATCH {}{} WHERE {} = ${} }}",
                    relation,
                    node_pattern(target),
                    attribute.expression(&target.internal_label),
                    parameter
                ),
                Attribute::Property(name) => format!(
                    "NOT {}(:`{}` {{{}: ${}}})",
                    relation, target.label, name, parameter
                ),
            };
            self.elements.where_elements.push(clause);
            self.elements
                .parameters
                .insert(parameter, value.constraint_value(&attribute));
        }
    }
}

/// Turn relevant links into MATCH/WHERE clauses and parameters.
///
/// The query target's own value constraint is never emitted here.
pub fn generate_query_elements(
    graph: &QueryGraph,
    provider: &dyn LabelProvider,
    config: &QueryConfig,
    target: NodeId,
    links: &[&Link],
    constraints_needed: bool,
) -> Result<QueryElements, GraphError> {
    let root = graph.root().ok_or(GraphError::EmptyGraph)?;
    let mut builder = Builder {
        provider,
        target,
        constraints_needed,
        elements: QueryElements::default(),
        predefined_done: HashSet::new(),
        values_done: HashSet::new(),
    };

    builder.add_predefined(root);
    builder.add_value_constraints(root);

    for link in links {
        let source = graph.require(link.source)?;
        let node = graph.require(link.target)?;
        let arrow = if config.use_relation_direction && !node.is_parent_rel_reverse {
            "->"
        } else {
            "-"
        };

        builder.add_predefined(source);
        if node.is_negative && negation_applies(graph, node.id, target) {
            builder.add_negation(source, link, node, arrow);
        } else {
            builder.add_relation(source, link, node, arrow);
            builder.add_predefined(node);
        }
        builder.add_value_constraints(node);
    }

    // no positive relation binds the root
    if builder.elements.match_elements.is_empty() {
        builder.elements.match_elements.push(node_pattern(root));
    }
    Ok(builder.elements)
}
