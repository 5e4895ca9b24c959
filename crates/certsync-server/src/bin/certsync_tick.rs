//! certsync-tick - run one sync tick and exit
//!
//! Meant for an external scheduler such as cron. Prints one JSON summary per
//! organization that ran.
//!
//! Usage:
//!   certsync-tick                 # every due organization
//!   certsync-tick --org tra       # force one organization
//!   certsync-tick --dry-run       # fetch and diff, keep nothing

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use certsync_common::logging::{init_logging, LogConfig, LogLevel};
use certsync_common::types::Organization;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use certsync_server::config::Config;
use certsync_server::ingest::memory::{MemoryRegistry, MemoryStateStore};
use certsync_server::ingest::{IngestConfig, SyncOrchestrator, SyncRunResult};

#[derive(Debug, Parser)]
#[command(name = "certsync-tick", version, about = "Run one certification sync tick")]
struct Cli {
    /// Organization to tick regardless of its refresh schedule (nar or tra)
    #[arg(long)]
    org: Option<Organization>,

    /// Use in-memory state and registry instead of the database
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("certsync-tick")
        .build();
    let log_config = log_config.merge_env().unwrap_or_else(|_| LogConfig::default());
    let _log_guard = init_logging(&log_config).ok().flatten();

    match run(&cli).await {
        Ok(results) => {
            for result in results {
                match serde_json::to_string(&result) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!(error = %e, "Failed to serialize tick result"),
                }
            }
        },
        Err(e) => {
            error!(error = %e, "Tick failed");
            eprintln!("Error: {:#}", e);
            process::exit(1);
        },
    }
}

async fn run(cli: &Cli) -> Result<Vec<SyncRunResult>> {
    let ingest_config = IngestConfig::from_env()?;

    let orchestrator = if cli.dry_run {
        info!("Dry run: nothing will be written to the database");
        SyncOrchestrator::from_config_with(
            &ingest_config,
            Arc::new(MemoryStateStore::default()),
            Arc::new(MemoryRegistry::default()),
        )?
    } else {
        let config = Config::load()?;
        let pool = PgPoolOptions::new()
            .max_connections(ingest_config.write_concurrency.try_into().unwrap_or(u32::MAX))
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        SyncOrchestrator::from_config(&ingest_config, pool)?
    };

    match cli.org {
        Some(organization) => Ok(vec![orchestrator.tick_organization(organization).await?]),
        None => Ok(orchestrator.tick().await),
    }
}
