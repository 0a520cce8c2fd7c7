use std::sync::Arc;

use clap::Parser;
use common::{llm::LlmClient, storage::db::SurrealDbClient, utils::config::get_config};
use processing_pipeline::{drain_queue, entity_worker::EntityWorker};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Drain entity tasks: typed entities and relationships per page.
#[derive(Parser, Debug)]
#[command(name = "entity-worker")]
struct Args {
    /// Maximum tasks to process
    #[arg(long, default_value_t = 10)]
    limit: usize,

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

    let worker = EntityWorker::new(LlmClient::from_config(&config));
    let stats = drain_queue(&worker, args.limit, &db).await?;

    println!("Processed: {}", stats.processed);
    println!("Succeeded: {}", stats.succeeded);
    println!("Failed: {}", stats.failed);

    Ok(())
}
