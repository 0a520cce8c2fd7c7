use std::sync::Arc;

use clap::{Parser, ValueEnum};
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use retrieval_pipeline::{
    agentic::format_results,
    search::{
        fulltext_search, graph_search, semantic_search, FULLTEXT_LIMIT, GRAPH_LIMIT,
        SEMANTIC_LIMIT,
    },
    SearchResult,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
enum Mode {
    Fulltext,
    Semantic,
    Graph,
}

/// Direct index search without the agentic planner.
#[derive(Parser, Debug)]
#[command(name = "search")]
struct Args {
    /// Search mode
    #[arg(long, value_enum, default_value_t = Mode::Fulltext)]
    mode: Mode,

    /// Maximum results
    #[arg(long)]
    limit: Option<usize>,

    /// Title term for match boosts (defaults to the search terms)
    #[arg(long)]
    title_term: Option<String>,

    /// Search terms
    #[arg(required = true)]
    terms: Vec<String>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if args.verbose { "debug" } else { "info" })
        }))
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_schema().await?;

    let terms = args.terms.join(" ");
    let title_term = args.title_term.clone().unwrap_or_else(|| terms.clone());

    let results = match args.mode {
        Mode::Fulltext => SearchResult::Fulltext(
            fulltext_search(
                &terms,
                &title_term,
                args.limit.unwrap_or(FULLTEXT_LIMIT),
                &db,
            )
            .await?,
        ),
        Mode::Semantic => SearchResult::Semantic(
            semantic_search(
                &terms,
                &title_term,
                args.limit.unwrap_or(SEMANTIC_LIMIT),
                &db,
            )
            .await?,
        ),
        Mode::Graph => SearchResult::Graph(
            graph_search(&terms, args.limit.unwrap_or(GRAPH_LIMIT), &db).await?,
        ),
    };

    println!("{}", format_results(&results, results.len().max(1)));

    Ok(())
}
