//! Statement transport
//!
//! Wire types of the transactional endpoint, the runner seam and its HTTP
//! implementation.

pub mod http;
pub mod traits;
mod types;

pub use http::HttpRunner;
pub use traits::StatementRunner;
pub use types::{
    parse_results, ResultRow, StatementBatch, StatementResult, TransactionError,
    TransactionResponse,
};

#[cfg(test)]
pub(crate) mod mock;
