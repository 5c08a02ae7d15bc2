//! Batch and response wire types of the transactional endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::Row;
use crate::query::CompiledStatement;

/// One request: statements executed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementBatch {
    pub statements: Vec<CompiledStatement>,
}

impl StatementBatch {
    pub fn new(statements: Vec<CompiledStatement>) -> Self {
        Self { statements }
    }

    pub fn single(statement: CompiledStatement) -> Self {
        Self::new(vec![statement])
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Endpoint response to a [`StatementBatch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<StatementResult>>,
    #[serde(default)]
    pub errors: Vec<TransactionError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<ResultRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub row: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl StatementResult {
    /// Build a result from row objects, using the first row's keys as columns.
    pub fn from_rows(rows: &[Row]) -> Self {
        let columns: Vec<String> = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        let data = rows
            .iter()
            .map(|row| ResultRow {
                row: columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();
        Self { columns, data }
    }

    /// Zip `columns` with each row.
    pub fn rows(&self) -> Vec<Row> {
        self.data
            .iter()
            .map(|data| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(data.row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Parse a response into one row list per statement.
///
/// Any reported error, or a missing `results` field, empties the whole
/// batch rather than returning a partial result.
pub fn parse_results(response: &TransactionResponse, expected: usize) -> Vec<Vec<Row>> {
    if !response.errors.is_empty() {
        for error in &response.errors {
            warn!("Statement error {}: {}", error.code, error.message);
        }
        return vec![Vec::new(); expected];
    }

    let Some(results) = response.results.as_ref() else {
        warn!("Response carries no results, treating the batch as empty");
        return vec![Vec::new(); expected];
    };

    let mut parsed: Vec<Vec<Row>> = results.iter().map(StatementResult::rows).collect();
    if parsed.len() < expected {
        parsed.resize(expected, Vec::new());
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_zips_columns() {
        let response: TransactionResponse = serde_json::from_value(json!({
            "results": [
                {
                    "columns": ["name", "count"],
                    "data": [{"row": ["Alice", 3]}, {"row": ["Bob", 1]}]
                },
                {"columns": ["count"], "data": [{"row": [12]}]}
            ],
            "errors": []
        }))
        .unwrap();

        let parsed = parse_results(&response, 2);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0][1]["name"], json!("Bob"));
        assert_eq!(parsed[0][1]["count"], json!(1));
        assert_eq!(parsed[1][0]["count"], json!(12));
    }

    #[test]
    fn test_errors_empty_every_statement() {
        let response: TransactionResponse = serde_json::from_value(json!({
            "results": [{"columns": ["count"], "data": [{"row": [1]}]}],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]
        }))
        .unwrap();

        let parsed = parse_results(&response, 3);
        assert_eq!(parsed, vec![Vec::<Row>::new(); 3]);
    }

    #[test]
    fn test_missing_results() {
        let response: TransactionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parse_results(&response, 2).len(), 2);
        assert!(parse_results(&response, 2).iter().all(Vec::is_empty));
    }

    #[test]
    fn test_batch_wire_shape() {
        let batch = StatementBatch::single(CompiledStatement {
            statement: "MATCH (n) RETURN n".into(),
            parameters: Default::default(),
        });
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["statements"][0]["statement"], "MATCH (n) RETURN n");
        assert_eq!(json["statements"][0]["parameters"], json!({}));
    }

    #[test]
    fn test_from_rows_round_trips() {
        let rows: Vec<Row> = vec![
            serde_json::from_value(json!({"label": "FOLLOWS", "target": "Person", "count": 4}))
                .unwrap(),
        ];
        let result = StatementResult::from_rows(&rows);
        assert_eq!(result.columns.len(), 3);
        assert_eq!(result.rows(), rows);
    }
}
