//! Query Canvas - command line
//!
//! Compiles schema files into Cypher statements and runs them against a
//! transactional endpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use query_canvas::model::{NodeType, QueryGraph, SchemaNode};
use query_canvas::{Config, ConfigProvider, LabelProvider, QueryCompiler, QuerySession};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "query-canvas")]
#[command(about = "Compile visual graph queries into Cypher")]
struct Cli {
    /// Configuration file (defaults to query-canvas.yaml)
    #[arg(short, long, global = true, env = "QUERY_CANVAS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the statements compiled from a schema file
    Compile {
        /// Schema file (YAML or JSON)
        schema: PathBuf,

        /// Return graph elements instead of flat attributes
        #[arg(long)]
        graph: bool,
    },

    /// Print taxonomy count statements, or run them with --execute
    Taxonomy {
        #[arg(required = true)]
        labels: Vec<String>,

        #[arg(long)]
        execute: bool,
    },

    /// Run the result query of a schema file and print the rows
    Run {
        /// Schema file (YAML or JSON)
        schema: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,query_canvas=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile { schema, graph } => compile(&config, &schema, graph),
        Commands::Taxonomy { labels, execute } => taxonomy(&config, &labels, execute).await,
        Commands::Run { schema } => run(&config, &schema).await,
    }
}

fn provider(config: &Config) -> Arc<dyn LabelProvider> {
    Arc::new(ConfigProvider::new(config.provider.clone()))
}

fn compile(config: &Config, schema_path: &Path, graph_mode: bool) -> Result<()> {
    let schema = SchemaNode::from_file(schema_path)?;
    let provider = provider(config);
    let compiler = QueryCompiler::new(provider.clone(), config.query.clone());

    let mut graph = QueryGraph::new(provider, config.query.page_size);
    graph.add_from_schema(&schema, None);

    let mut nodes = Vec::new();
    for node in graph.nodes() {
        if node.node_type == NodeType::Value {
            continue;
        }
        let count = if node.is_countable() {
            Some(compiler.node_count_query(&graph, node.id)?)
        } else {
            None
        };
        nodes.push(json!({
            "id": node.id,
            "label": node.label,
            "internal_label": node.internal_label,
            "count": count,
            "value": compiler.node_value_query(&graph, node.id)?,
            "relation": compiler.node_relation_query(&graph, node.id)?,
        }));
    }

    let output = json!({
        "result": compiler.result_query(&graph, graph_mode)?,
        "nodes": nodes,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn taxonomy(config: &Config, labels: &[String], execute: bool) -> Result<()> {
    if !execute {
        let compiler = QueryCompiler::new(provider(config), config.query.clone());
        let statements: Vec<_> = labels
            .iter()
            .map(|label| compiler.taxonomy_count_query(label))
            .collect();
        println!("{}", serde_json::to_string_pretty(&statements)?);
        return Ok(());
    }

    let session = QuerySession::new(
        provider(config),
        config.query.clone(),
        Arc::new(config.runner()),
    );
    for (label, count) in session.taxonomy_counts(labels).await? {
        println!("{}\t{}", label, count);
    }
    Ok(())
}

async fn run(config: &Config, schema_path: &Path) -> Result<()> {
    let schema = SchemaNode::from_file(schema_path)?;
    let mut session = QuerySession::new(
        provider(config),
        config.query.clone(),
        Arc::new(config.runner()),
    );
    session.start_from_schema(&schema, None).await?;

    tracing::info!("{} result rows", session.results().len());
    println!("{}", serde_json::to_string_pretty(session.results())?);
    Ok(())
}
