//! Query graph errors.

use super::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {0} is not a value node")]
    NotAValueNode(NodeId),

    #[error("node {node} has no relationship segment at index {index}")]
    SegmentNotFound { node: NodeId, index: usize },

    #[error("the query graph is empty")]
    EmptyGraph,

    #[error("a value fetch is already in progress")]
    ValueFetchInProgress,
}
