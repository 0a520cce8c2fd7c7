use std::sync::Arc;

use clap::Parser;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use sync_pipeline::planet::{PlanetSyncOptions, PlanetSyncer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sync Planet feed posts into the content store.
#[derive(Parser, Debug)]
#[command(name = "planet-sync")]
struct Args {
    /// Fetch posts from the last N days
    #[arg(long, default_value_t = 30)]
    days: i64,

    /// Maximum feed items to process
    #[arg(long)]
    max: Option<usize>,

    /// Remove entries older than N days (0 to disable)
    #[arg(long)]
    prune_days: Option<i64>,

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

    let syncer = PlanetSyncer::new(&config)?;
    let stats = syncer
        .sync(
            &PlanetSyncOptions {
                max_age_days: args.days,
                max_items: args.max,
                prune_days: args.prune_days.or(Some(config.planet_retention_days)),
                dry_run: args.dry_run,
                with_entities: args.with_entities,
            },
            &db,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
