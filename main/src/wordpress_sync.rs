use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use sync_pipeline::wordpress::{WordPressSyncOptions, WordPressSyncer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sync WordPress pages into the content store.
#[derive(Parser, Debug)]
#[command(name = "wordpress-sync")]
struct Args {
    /// ISO timestamp; only pages modified after this are synced
    #[arg(long)]
    since: Option<String>,

    /// Number of days to look back (default: 7)
    #[arg(long)]
    days: Option<i64>,

    /// Ignore the date filter and sync every published page
    #[arg(long)]
    full: bool,

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

    let modified_after = match (&args.since, args.days) {
        (Some(raw), _) => Some(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc)),
        (None, Some(days)) => Some(Utc::now() - chrono::Duration::days(days)),
        (None, None) => None,
    };

    let syncer = WordPressSyncer::new(&config)?;
    let stats = syncer
        .sync(
            &WordPressSyncOptions {
                modified_after,
                full: args.full,
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
