//! Query a product database from the command line.
//!
//! Handy for eyeballing ranking changes without standing up a serving layer.
//!
//! Usage:
//!     cargo run --release --bin query-db -- --db-path demo.sqlite contactor af140
//!     cargo run --release --bin query-db -- --db-path demo.sqlite --catalog-only "emergency stop"

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use hound::config::SearchConfig;
use hound::{MatchType, SearchStore, SearchStoreApi};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the SQLite product database
    #[arg(short, long, default_value = "hound-demo.sqlite")]
    db_path: PathBuf,

    /// Optional JSON config overriding the search defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of results to print
    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: u32,

    /// Skip training matches and the relevance model
    #[arg(long)]
    catalog_only: bool,

    /// Print the raw response as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// The search query, remaining words are joined with spaces
    #[arg(required = true)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hound=info")),
        )
        .init();

    let args = Args::parse();
    let query = args.query.join(" ");

    let config = match &args.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SearchConfig::default(),
    };

    let store = SearchStore::new(&args.db_path, config)
        .with_context(|| format!("failed to open search store at {}", args.db_path.display()))?;

    let response = if args.catalog_only {
        store.catalog_search(query, args.top_k).await
    } else {
        store.search(query, args.top_k).await
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if !response.success {
        anyhow::bail!(
            "search failed: {}",
            response.error.unwrap_or_else(|| "unknown error".into())
        );
    }

    let health = store.health();
    println!(
        "{} results for {:?} in {:.1} ms (catalog: {}, model: {})",
        response.total_results,
        response.query,
        response.search_time * 1000.0,
        health.catalog_size,
        if health.model_loaded { "loaded" } else { "none" },
    );
    println!();
    println!(
        "{:>3}  {:<18} {:<6} {:>6} {:>6} {:>6}  {}",
        "#", "ORDER CODE", "TYPE", "PROB", "TFIDF", "FUZZY", "DESCRIPTION"
    );

    for (rank, result) in response.results.iter().enumerate() {
        let match_type = match result.match_type {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
        };
        let probability = result
            .probability
            .map(|p| format!("{p:.3}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}  {:<18} {:<6} {:>6} {:>6.3} {:>6.3}  {}",
            rank + 1,
            result.order_code,
            match_type,
            probability,
            result.tfidf_score,
            result.fuzzy_score,
            result.description,
        );
        if let Some(trained) = &result.training_query {
            println!("{:>3}  {:<18} matched stored query {trained:?}", "", "");
        }
    }

    Ok(())
}
