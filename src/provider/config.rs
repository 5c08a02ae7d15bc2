//! Configuration-backed label provider.
//!
//! Each label may override any property and may name a `parent` label to
//! inherit from. Resolution walks label → parent chain → default record →
//! built-in defaults, taking the first value found for each property.
//! Resolved records are memoized per label.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Node, SchemaNode};
use crate::query::{QueryKind, StatementParts, COUNT_COLUMN};

use super::{Attribute, LabelProvider};

/// Statement rewrite hook registered for a label and statement kind.
pub type QueryFilter = Arc<dyn Fn(&Node, StatementParts) -> StatementParts + Send + Sync>;

/// Per-label overrides. Every property is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Label whose configuration fills in properties missing here
    pub parent: Option<String>,
    pub constraint_attribute: Option<Attribute>,
    pub return_attributes: Option<Vec<Attribute>>,
    pub predefined_constraints: Option<Vec<String>>,
    pub value_order_by_attribute: Option<String>,
    pub value_order_ascending: Option<bool>,
    pub result_order_by_attributes: Option<Vec<String>>,
    pub result_order_ascending: Option<Vec<bool>>,
    pub auto_load_value: Option<bool>,
    pub auto_expand_relations: Option<bool>,
    pub immutable: Option<bool>,
    pub schema: Option<SchemaNode>,
}

/// Provider section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Record consulted when neither a label nor its parents define a property
    pub default_label: LabelConfig,
    pub labels: HashMap<String, LabelConfig>,
}

/// Fully resolved properties of one label.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLabel {
    pub constraint_attribute: Attribute,
    pub return_attributes: Vec<Attribute>,
    pub predefined_constraints: Vec<String>,
    pub value_order_by_attribute: Option<String>,
    pub value_order_ascending: bool,
    pub result_order_by_attributes: Vec<String>,
    pub result_order_ascending: Vec<bool>,
    pub auto_load_value: bool,
    pub auto_expand_relations: bool,
    pub immutable: bool,
    pub schema: Option<SchemaNode>,
}

impl Default for ResolvedLabel {
    fn default() -> Self {
        Self {
            constraint_attribute: Attribute::InternalId,
            return_attributes: vec![Attribute::InternalId],
            predefined_constraints: vec![],
            value_order_by_attribute: Some(COUNT_COLUMN.to_string()),
            value_order_ascending: false,
            result_order_by_attributes: vec![],
            result_order_ascending: vec![true],
            auto_load_value: false,
            auto_expand_relations: false,
            immutable: false,
            schema: None,
        }
    }
}

/// Take the first value defined along the resolution chain.
macro_rules! resolve_field {
    ($chain:expr, $field:ident, $fallback:expr) => {
        $chain
            .iter()
            .find_map(|config| config.$field.clone())
            .unwrap_or($fallback)
    };
}

/// `LabelProvider` backed by a [`ProviderConfig`] plus programmatic hooks.
pub struct ConfigProvider {
    config: ProviderConfig,
    cache: DashMap<String, Arc<ResolvedLabel>>,
    filters: HashMap<(String, QueryKind), QueryFilter>,
}

impl ConfigProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
            filters: HashMap::new(),
        }
    }

    /// Register a statement rewrite hook for a label.
    ///
    /// Hooks are inherited through `parent` like any other property.
    pub fn with_filter(
        mut self,
        label: impl Into<String>,
        kind: QueryKind,
        filter: QueryFilter,
    ) -> Self {
        self.filters.insert((label.into(), kind), filter);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Resolve (and memoize) every property of `label`.
    pub fn resolve(&self, label: &str) -> Arc<ResolvedLabel> {
        if let Some(resolved) = self.cache.get(label) {
            return resolved.clone();
        }

        let chain = self.chain(label);
        let fallback = ResolvedLabel::default();
        let resolved = Arc::new(ResolvedLabel {
            constraint_attribute: resolve_field!(
                chain,
                constraint_attribute,
                fallback.constraint_attribute
            ),
            return_attributes: resolve_field!(chain, return_attributes, fallback.return_attributes),
            predefined_constraints: resolve_field!(
                chain,
                predefined_constraints,
                fallback.predefined_constraints
            ),
            value_order_by_attribute: chain
                .iter()
                .find_map(|config| config.value_order_by_attribute.clone())
                .or(fallback.value_order_by_attribute),
            value_order_ascending: resolve_field!(
                chain,
                value_order_ascending,
                fallback.value_order_ascending
            ),
            result_order_by_attributes: resolve_field!(
                chain,
                result_order_by_attributes,
                fallback.result_order_by_attributes
            ),
            result_order_ascending: resolve_field!(
                chain,
                result_order_ascending,
                fallback.result_order_ascending
            ),
            auto_load_value: resolve_field!(chain, auto_load_value, fallback.auto_load_value),
            auto_expand_relations: resolve_field!(
                chain,
                auto_expand_relations,
                fallback.auto_expand_relations
            ),
            immutable: resolve_field!(chain, immutable, fallback.immutable),
            schema: chain.iter().find_map(|config| config.schema.clone()),
        });

        self.cache.insert(label.to_string(), resolved.clone());
        resolved
    }

    /// Label configs to consult, most specific first, ending with the default record.
    fn chain(&self, label: &str) -> Vec<&LabelConfig> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(label.to_string());

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                warn!("Cyclic parent chain for label `{}` at `{}`", label, name);
                break;
            }
            match self.config.labels.get(&name) {
                Some(config) => {
                    chain.push(config);
                    current = config.parent.clone();
                }
                None if name == label => {
                    warn!(
                        "No provider configuration for label `{}`, using defaults",
                        label
                    );
                    current = None;
                }
                None => {
                    warn!(
                        "Label `{}` names unknown parent `{}`, using defaults",
                        label, name
                    );
                    current = None;
                }
            }
        }

        chain.push(&self.config.default_label);
        chain
    }

    fn filter(&self, kind: QueryKind, node: &Node, parts: StatementParts) -> StatementParts {
        let mut visited = HashSet::new();
        let mut current = Some(node.label.clone());
        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                break;
            }
            if let Some(filter) = self.filters.get(&(name.clone(), kind)) {
                return filter(node, parts);
            }
            current = self
                .config
                .labels
                .get(&name)
                .and_then(|config| config.parent.clone());
        }
        parts
    }
}

impl LabelProvider for ConfigProvider {
    fn constraint_attribute(&self, label: &str) -> Attribute {
        self.resolve(label).constraint_attribute.clone()
    }

    fn return_attributes(&self, label: &str) -> Vec<Attribute> {
        self.resolve(label).return_attributes.clone()
    }

    fn predefined_constraints(&self, label: &str) -> Vec<String> {
        self.resolve(label).predefined_constraints.clone()
    }

    fn value_order_by_attribute(&self, label: &str) -> Option<String> {
        self.resolve(label).value_order_by_attribute.clone()
    }

    fn is_value_order_ascending(&self, label: &str) -> bool {
        self.resolve(label).value_order_ascending
    }

    fn result_order_by_attributes(&self, label: &str) -> Vec<String> {
        self.resolve(label).result_order_by_attributes.clone()
    }

    fn result_order_ascending(&self, label: &str) -> Vec<bool> {
        self.resolve(label).result_order_ascending.clone()
    }

    fn is_auto_load_value(&self, label: &str) -> bool {
        self.resolve(label).auto_load_value
    }

    fn is_auto_expand_relations(&self, label: &str) -> bool {
        self.resolve(label).auto_expand_relations
    }

    fn is_immutable(&self, label: &str) -> bool {
        self.resolve(label).immutable
    }

    fn schema(&self, label: &str) -> Option<SchemaNode> {
        self.resolve(label).schema.clone()
    }

    fn filter_result_query(&self, node: &Node, parts: StatementParts) -> StatementParts {
        self.filter(QueryKind::Result, node, parts)
    }

    fn filter_node_value_query(&self, node: &Node, parts: StatementParts) -> StatementParts {
        self.filter(QueryKind::NodeValue, node, parts)
    }

    fn filter_node_count_query(&self, node: &Node, parts: StatementParts) -> StatementParts {
        self.filter(QueryKind::NodeCount, node, parts)
    }

    fn filter_node_relation_query(&self, node: &Node, parts: StatementParts) -> StatementParts {
        self.filter(QueryKind::NodeRelation, node, parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ConfigProvider {
        let yaml = r#"
default_label:
  return_attributes:
    - internal_id
labels:
  Person:
    constraint_attribute:
      property: name
    return_attributes:
      - property: name
      - property: born
    predefined_constraints:
      - "$identifier.active = true"
    auto_load_value: true
  Actor:
    parent: Person
    immutable: true
  Loop:
    parent: Loop
"#;
        ConfigProvider::new(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_explicit_properties() {
        let provider = provider();
        assert_eq!(
            provider.constraint_attribute("Person"),
            Attribute::property("name")
        );
        assert_eq!(provider.return_attributes("Person").len(), 2);
        assert!(provider.is_auto_load_value("Person"));
        assert!(!provider.is_immutable("Person"));
    }

    #[test]
    fn test_parent_inheritance() {
        let provider = provider();
        assert_eq!(
            provider.constraint_attribute("Actor"),
            Attribute::property("name")
        );
        assert_eq!(
            provider.predefined_constraints("Actor"),
            vec!["$identifier.active = true".to_string()]
        );
        assert!(provider.is_immutable("Actor"));
    }

    #[test]
    fn test_unknown_label_uses_defaults() {
        let provider = provider();
        assert_eq!(provider.constraint_attribute("Movie"), Attribute::InternalId);
        assert_eq!(
            provider.value_order_by_attribute("Movie"),
            Some("count".to_string())
        );
        assert!(!provider.is_value_order_ascending("Movie"));
        assert!(provider.result_order_by_attributes("Movie").is_empty());
        assert!(provider.schema("Movie").is_none());
    }

    #[test]
    fn test_cyclic_parent_terminates() {
        let provider = provider();
        assert_eq!(provider.constraint_attribute("Loop"), Attribute::InternalId);
    }

    #[test]
    fn test_resolution_is_memoized() {
        let provider = provider();
        let first = provider.resolve("Person");
        let second = provider.resolve("Person");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_filter_inherited_from_parent() {
        let filter: QueryFilter = Arc::new(|_node: &Node, mut parts: StatementParts| {
            parts.where_elements.push("true".to_string());
            parts
        });
        let provider = provider().with_filter("Person", QueryKind::NodeCount, filter);
        let node = crate::test_helpers::query_node("Actor", "actor");

        let parts = provider.filter_node_count_query(&node, StatementParts::default());
        assert_eq!(parts.where_elements, vec!["true".to_string()]);

        let untouched = provider.filter_node_value_query(&node, StatementParts::default());
        assert!(untouched.where_elements.is_empty());
    }
}
