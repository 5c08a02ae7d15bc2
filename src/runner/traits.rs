//! StatementRunner trait definition
//!
//! Transport seam between the session and the database. Implementations
//! execute a batch and return the raw response; parsing and merging stay in
//! the session.

use anyhow::Result;
use async_trait::async_trait;

use super::{StatementBatch, TransactionResponse};

/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use query_canvas::runner::{StatementBatch, StatementResult, TransactionResponse};
/// use query_canvas::StatementRunner;
///
/// /// Answers every statement with no rows.
/// struct EmptyRunner;
///
/// #[async_trait]
/// impl StatementRunner for EmptyRunner {
///     async fn run(&self, batch: StatementBatch) -> Result<TransactionResponse> {
///         Ok(TransactionResponse {
///             results: Some(vec![StatementResult::default(); batch.len()]),
///             errors: vec![],
///         })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let response = EmptyRunner.run(StatementBatch::new(vec![])).await.unwrap();
/// assert_eq!(response.results, Some(vec![]));
/// # });
/// ```
#[async_trait]
pub trait StatementRunner: Send + Sync {
    /// Execute every statement of `batch` in one round trip.
    ///
    /// Dropping the returned future must abort the request.
    async fn run(&self, batch: StatementBatch) -> Result<TransactionResponse>;
}
