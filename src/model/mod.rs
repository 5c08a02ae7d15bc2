//! Query graph model
//!
//! Nodes, links and the tree-shaped query graph the user edits.

mod error;
mod graph;
mod labels;
mod schema;
mod types;

pub use error::GraphError;
pub use graph::{QueryGraph, DEFAULT_PAGE_SIZE};
pub use labels::InternalLabels;
pub use schema::{SchemaNode, SchemaRelation};
pub use types::*;
