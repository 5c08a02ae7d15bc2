//! Query Canvas
//!
//! An interactive graph query model with:
//! - A tree-shaped query graph built by clicking labels, relations and values
//! - A compiler turning the graph into parameterized Cypher statements
//! - Cancelable per-concern requests against a transactional HTTP endpoint
//! - Broadcast events telling a rendering layer when to re-read the model

pub mod model;
pub mod provider;
pub mod query;
pub mod runner;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use model::{GraphError, NodeId, QueryGraph};
pub use provider::{ConfigProvider, LabelConfig, LabelProvider, ProviderConfig};
pub use query::{CompiledStatement, QueryCompiler, QueryConfig};
pub use runner::{HttpRunner, StatementRunner};
pub use session::{QuerySession, SessionEvent, SessionEventKind};

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub database: DatabaseYamlConfig,
    pub query: QueryConfig,
    /// Provider record consulted when a label defines nothing itself
    pub default_label: LabelConfig,
    pub labels: HashMap<String, LabelConfig>,
}

/// Database connection section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseYamlConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseYamlConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
            database: "neo4j".into(),
        }
    }
}

impl YamlConfig {
    /// Label provider configuration carried by the file
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            default_label: self.default_label.clone(),
            labels: self.labels.clone(),
        }
    }
}

// ============================================================================
// Runtime config
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_url: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    pub query: QueryConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "query-canvas.yaml" in CWD. If the file
    /// doesn't exist, falls back to env vars / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);
        let provider = yaml.provider_config();

        let mut query = yaml.query;
        query.max_results_count = std::env::var("QUERY_MAX_RESULTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(query.max_results_count);

        Ok(Self {
            neo4j_url: std::env::var("NEO4J_URL").unwrap_or(yaml.database.url),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.database.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.database.password),
            neo4j_database: std::env::var("NEO4J_DATABASE").unwrap_or(yaml.database.database),
            query,
            provider,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("query-canvas.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    /// HTTP runner for the configured database
    pub fn runner(&self) -> HttpRunner {
        HttpRunner::new(
            &self.neo4j_url,
            &self.neo4j_database,
            &self.neo4j_user,
            &self.neo4j_password,
        )
    }
}
