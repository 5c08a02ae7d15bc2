//! Statement structure and serialization.
//!
//! Statements are assembled as a [`StatementParts`] so label-specific hooks
//! can rewrite individual clauses before the text is produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column holding counts in count, value and relation queries.
pub const COUNT_COLUMN: &str = "count";

/// Column holding collected relations in value queries.
pub const INCOMING_RELS_COLUMN: &str = "incomingRels";

/// Statement parameters. Ordered for reproducible output.
pub type Parameters = BTreeMap<String, Value>;

/// The statement kinds the compiler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Result,
    NodeCount,
    NodeValue,
    NodeRelation,
    Taxonomy,
}

/// A statement before serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementParts {
    pub match_elements: Vec<String>,
    pub where_elements: Vec<String>,
    pub return_elements: Vec<String>,
    /// `RETURN DISTINCT`
    pub distinct: bool,
    /// Trailing clauses (ORDER BY, LIMIT), space-joined
    pub end_elements: Vec<String>,
    pub parameters: Parameters,
}

impl StatementParts {
    /// Render as statement text.
    pub fn to_statement(&self, prefix: &str) -> String {
        let mut statement = format!("{}MATCH {}", prefix, self.match_elements.join(", "));

        if !self.where_elements.is_empty() {
            statement.push_str(" WHERE ");
            statement.push_str(&self.where_elements.join(" AND "));
        }

        statement.push_str(" RETURN ");
        if self.distinct {
            statement.push_str("DISTINCT ");
        }
        statement.push_str(&self.return_elements.join(", "));

        if !self.end_elements.is_empty() {
            statement.push(' ');
            statement.push_str(&self.end_elements.join(" "));
        }
        statement
    }

    pub fn compile(self, prefix: &str) -> CompiledStatement {
        CompiledStatement {
            statement: self.to_statement(prefix),
            parameters: self.parameters,
        }
    }
}

/// Statement text plus parameters, as sent to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledStatement {
    pub statement: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_statement() {
        let parts = StatementParts {
            match_elements: vec!["(person:`Person`)".into()],
            return_elements: vec!["ID(person) AS NEO4JID".into()],
            distinct: true,
            end_elements: vec!["LIMIT 100".into()],
            ..Default::default()
        };
        assert_eq!(
            parts.to_statement(""),
            "MATCH (person:`Person`) RETURN DISTINCT ID(person) AS NEO4JID LIMIT 100"
        );
    }

    #[test]
    fn test_where_and_prefix() {
        let parts = StatementParts {
            match_elements: vec!["(a:`A`)-[r0:`R`]->(b:`B`)".into(), "(c:`C`)".into()],
            where_elements: vec!["a.x = $a_x".into(), "b.y > 1".into()],
            return_elements: vec!["count(a) AS count".into()],
            ..Default::default()
        };
        assert_eq!(
            parts.to_statement("CYPHER 5 "),
            "CYPHER 5 MATCH (a:`A`)-[r0:`R`]->(b:`B`), (c:`C`) WHERE a.x = $a_x AND b.y > 1 RETURN count(a) AS count"
        );
    }

    #[test]
    fn test_compiled_statement_wire_shape() {
        let mut parameters = Parameters::new();
        parameters.insert("person_name".into(), Value::from("Alice"));
        let compiled = StatementParts {
            match_elements: vec!["(person:`Person`)".into()],
            return_elements: vec!["person".into()],
            parameters,
            ..Default::default()
        }
        .compile("");

        let json = serde_json::to_value(&compiled).unwrap();
        assert_eq!(json["statement"], "MATCH (person:`Person`) RETURN person");
        assert_eq!(json["parameters"]["person_name"], "Alice");
    }
}
