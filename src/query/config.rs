//! Compiler settings.

use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_PAGE_SIZE;

/// Which of a discovered node's labels names a relation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationTargetLabel {
    First,
    #[default]
    Last,
}

impl RelationTargetLabel {
    /// List function applied to `labels(x)` in relation discovery.
    pub fn function(&self) -> &'static str {
        match self {
            Self::First => "head",
            Self::Last => "last",
        }
    }
}

/// `query` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// LIMIT of the result query
    pub max_results_count: usize,
    /// LIMIT of node-value queries
    pub value_query_limit: usize,
    /// Value nodes shown per page
    pub page_size: usize,
    /// Emit `->` in MATCH fragments; `-` otherwise
    pub use_relation_direction: bool,
    /// Value queries also return the matched relations as `incomingRels`
    pub collect_relations_with_values: bool,
    /// Raw text prepended to every statement
    pub statement_prefix: String,
    pub relation_target_label: RelationTargetLabel,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results_count: 100,
            value_query_limit: 100,
            page_size: DEFAULT_PAGE_SIZE,
            use_relation_direction: true,
            collect_relations_with_values: false,
            statement_prefix: String::new(),
            relation_target_label: RelationTargetLabel::Last,
        }
    }
}
