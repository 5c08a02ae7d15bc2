//! Scripted in-memory runner for testing.
//!
//! Each statement of a batch is answered by the first rule whose pattern
//! occurs in the statement text; unmatched statements get an empty result.
//! A gated runner holds every request until the test releases a permit.
//! Conditionally compiled with `#[cfg(test)]`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{RwLock, Semaphore};

use crate::model::Row;

use super::{StatementBatch, StatementResult, StatementRunner, TransactionResponse};

struct Rule {
    pattern: String,
    rows: Vec<Row>,
}

#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<Rule>>,
    failing: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    pub batches: RwLock<Vec<StatementBatch>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` with `rows`.
    pub fn with_rows(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.add_rows(pattern, rows);
        self
    }

    /// Hold every request until a permit is added to the returned gate.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Add a rule; earlier rules win.
    pub fn add_rows(&self, pattern: &str, rows: Vec<Row>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                rows,
            });
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn statements(&self) -> Vec<String> {
        self.batches
            .read()
            .await
            .iter()
            .flat_map(|b| b.statements.iter().map(|s| s.statement.clone()))
            .collect()
    }

    fn answer(&self, statement: &str) -> StatementResult {
        let rules = match self.rules.lock() {
            Ok(rules) => rules,
            Err(_) => return StatementResult::default(),
        };
        rules
            .iter()
            .find(|rule| statement.contains(&rule.pattern))
            .map(|rule| StatementResult::from_rows(&rule.rows))
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatementRunner for MockRunner {
    async fn run(&self, batch: StatementBatch) -> Result<TransactionResponse> {
        self.batches.write().await.push(batch.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("scripted transport failure");
        }

        let results = batch
            .statements
            .iter()
            .map(|s| self.answer(&s.statement))
            .collect();
        Ok(TransactionResponse {
            results: Some(results),
            errors: vec![],
        })
    }
}
