use std::sync::Arc;

use clap::Parser;
use common::{llm::LlmClient, storage::db::SurrealDbClient, utils::config::get_config};
use retrieval_pipeline::agentic::{AgenticPlanner, PlannerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ask the wiki a question through the agentic planner.
#[derive(Parser, Debug)]
#[command(name = "ask")]
struct Args {
    /// Language to answer in (full name, e.g. "English", "Spanish")
    #[arg(long, default_value = "English")]
    language: String,

    /// Maximum search iterations
    #[arg(long, default_value_t = 3)]
    max_iterations: usize,

    /// Cite page URLs for graph-mode answers
    #[arg(long)]
    cite_graph_sources: bool,

    /// The question
    #[arg(required = true)]
    question: Vec<String>,

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

    let planner = AgenticPlanner::new(
        db,
        LlmClient::from_config(&config),
        PlannerConfig {
            max_iterations: args.max_iterations,
            cite_graph_sources: args.cite_graph_sources,
            ..PlannerConfig::default()
        },
    );

    let question = args.question.join(" ");
    let outcome = planner.answer(&question, &args.language).await;

    println!("{}", outcome.answer);

    if !outcome.sources.is_empty() {
        println!("\nSources:");
        for source in &outcome.sources {
            println!("- {} ({})", source.title, source.url);
        }
    }

    Ok(())
}
