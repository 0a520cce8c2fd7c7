use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use sync_pipeline::wiki::{WikiSyncOptions, WikiSyncer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sync OSGeo wiki changes into the content store.
#[derive(Parser, Debug)]
#[command(name = "wiki-sync")]
struct Args {
    /// ISO timestamp to sync from (overrides --days)
    #[arg(long)]
    since: Option<String>,

    /// Number of days to look back
    #[arg(long, default_value_t = 1)]
    days: i64,

    /// Maximum pages to process
    #[arg(long)]
    max: Option<usize>,

    /// Show what would be updated without making changes
    #[arg(long)]
    dry_run: bool,

    /// Also enqueue entity extraction tasks
    #[arg(long)]
    with_entities: bool,

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

    let since = match &args.since {
        Some(raw) => DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc),
        None => Utc::now() - Duration::days(args.days),
    };

    let syncer = WikiSyncer::new(&config)?;
    let stats = syncer
        .sync(
            &WikiSyncOptions {
                since,
                max_pages: args.max,
                dry_run: args.dry_run,
                with_entities: args.with_entities,
            },
            &db,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
