//! Cypher compiler
//!
//! Relevance resolution, fragment generation and the statement kinds built
//! from them.

mod config;
pub mod elements;
pub mod relevance;
mod statements;
mod structure;

pub use config::{QueryConfig, RelationTargetLabel};
pub use elements::{generate_query_elements, node_value_constraints, QueryElements};
pub use relevance::{links_to_root, negation_applies, relevant_links};
pub use statements::{QueryCompiler, RELATION_TARGET_VARIABLE, RELATION_VARIABLE};
pub use structure::{
    CompiledStatement, Parameters, QueryKind, StatementParts, COUNT_COLUMN, INCOMING_RELS_COLUMN,
};
