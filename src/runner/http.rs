//! HTTP runner for the transactional Cypher endpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{StatementBatch, StatementRunner, TransactionResponse};

/// Posts batches to `{url}/db/{database}/tx/commit` with basic auth.
#[derive(Debug, Clone)]
pub struct HttpRunner {
    http_client: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl HttpRunner {
    pub fn new(url: &str, database: &str, user: &str, password: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: format!("{}/db/{}/tx/commit", url.trim_end_matches('/'), database),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StatementRunner for HttpRunner {
    async fn run(&self, batch: StatementBatch) -> Result<TransactionResponse> {
        debug!(
            endpoint = %self.endpoint,
            statements = batch.len(),
            "Posting statement batch"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&batch)
            .send()
            .await
            .context("Failed to reach the transactional endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no body".to_string());
            bail!("Statement batch failed ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse transaction response")
    }
}
