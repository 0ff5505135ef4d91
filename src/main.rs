//! relgraph CLI: seed a graph from a directory, then query it, print its
//! statistics, or keep it populated with periodic discovery.

use anyhow::Result;
use clap::{Parser, Subcommand};
use relgraph::discovery::{apply_batch, DirectoryLoader, DiscoveryWorker, SourceLoader};
use relgraph::{
    Config, EntityType, GraphQuery, GraphStore, QueryEngine, QueryType, RelationshipType,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "relgraph")]
#[command(version, about = "Query an in-memory relationship graph")]
struct Cli {
    /// Config file (default: $RELGRAPH_CONFIG, then ./relgraph.toml, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of .json/.yaml seed files (overrides [discovery].seed_dir)
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one query and print the result as JSON
    Query {
        /// find_related | trace_impact | find_similar | explore_connections
        mode: QueryType,

        /// Start entity id
        start: String,

        #[arg(long)]
        depth: Option<usize>,

        /// Relationship type allow-list (repeatable)
        #[arg(long = "rel-type")]
        rel_types: Vec<RelationshipType>,

        /// Entity type allow-list (repeatable)
        #[arg(long = "entity-type")]
        entity_types: Vec<EntityType>,

        /// Minimum relationship strength (similarity score for find_similar)
        #[arg(long)]
        threshold: Option<f64>,

        /// Also print follow-up query suggestions
        #[arg(long)]
        suggest: bool,
    },

    /// Print graph statistics as JSON
    Stats,

    /// Reload the seed directory periodically until Ctrl+C
    Discover {
        /// Seconds between passes (default: [discovery].interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load_from(path);
    }

    let _ = dotenv::dotenv();
    let default_path = std::env::var("RELGRAPH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("relgraph.toml"));
    if default_path.exists() {
        Config::load()
    } else {
        Ok(Config::default())
    }
}

fn build_query(
    mode: QueryType,
    start: String,
    depth: Option<usize>,
    rel_types: Vec<RelationshipType>,
    entity_types: Vec<EntityType>,
    threshold: Option<f64>,
) -> GraphQuery {
    let mut query = GraphQuery::new(mode, start);
    if let Some(depth) = depth {
        query = query.with_max_depth(depth);
    }
    if !rel_types.is_empty() {
        query = query.with_relationship_types(rel_types);
    }
    if !entity_types.is_empty() {
        query = query.with_entity_types(entity_types);
    }
    if let Some(threshold) = threshold {
        query = query.with_confidence_threshold(threshold);
    }
    query
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.engine.log_level.as_str()),
    )
    .init();

    let engine = Arc::new(QueryEngine::from_config(Arc::new(GraphStore::new()), &config)?);
    let seed_dir = cli.seed.clone().or_else(|| config.discovery.seed_dir.clone());
    let loader = seed_dir.map(DirectoryLoader::new);

    if let Some(loader) = &loader {
        let report = apply_batch(&engine, loader.load()?);
        log::info!(
            "Seeded from {}: {} entities, {} relationships",
            loader.root().display(),
            report.entities_added,
            report.relationships_added
        );
    }

    match cli.command {
        Command::Query {
            mode,
            start,
            depth,
            rel_types,
            entity_types,
            threshold,
            suggest,
        } => {
            let query = build_query(mode, start, depth, rel_types, entity_types, threshold);
            let result = engine.query(&query);
            let output = if suggest {
                let suggestions = engine.get_suggestions(&query, &result);
                serde_json::json!({ "result": result, "suggestions": suggestions })
            } else {
                serde_json::to_value(&result)?
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.statistics())?);
        }
        Command::Discover { interval_secs } => {
            let loader = loader.ok_or_else(|| {
                anyhow::anyhow!(
                    "discover needs a seed directory: pass --seed or set [discovery].seed_dir"
                )
            })?;
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(config.discovery.interval_secs));
            if interval.is_zero() {
                anyhow::bail!("discovery interval must be greater than 0");
            }

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let handle =
                DiscoveryWorker::new(engine.clone(), Arc::new(loader), interval).spawn(shutdown_rx);

            log::info!("Discovery running every {:?} (Ctrl+C to stop)", interval);
            tokio::signal::ctrl_c().await?;
            let _ = shutdown_tx.send(true);
            handle.await?;

            println!("{}", serde_json::to_string_pretty(&engine.statistics())?);
        }
    }

    Ok(())
}
