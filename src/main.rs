// ABOUTME: CLI entry point for staging-sync
// ABOUTME: Parses commands and routes to table syncs and bucket mirroring

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use staging_sync::config::{self, SecretConfig};
use staging_sync::mirror::{self, DirBucket};
use staging_sync::sync;

#[derive(Parser)]
#[command(name = "staging-sync")]
#[command(
    about = "Incremental production-to-staging table sync with bucket mirroring",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every configured table, then mirror configured bucket pairs
    Run {
        /// Records per insert batch
        #[arg(long, default_value_t = sync::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Skip the bucket mirroring step
        #[arg(long)]
        skip_buckets: bool,
    },
    /// Sync a single configured table
    SyncTable {
        /// Table name as it appears in the service table config
        name: String,
        /// Records per insert batch
        #[arg(long, default_value_t = sync::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Mirror configured bucket pairs without touching any tables
    MirrorBuckets {
        /// Only report what would be copied
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run {
            batch_size,
            skip_buckets,
        } => run_everything(batch_size, skip_buckets).await,
        Commands::SyncTable { name, batch_size } => sync_one(&name, batch_size).await,
        Commands::MirrorBuckets { dry_run } => {
            if !mirror_configured_buckets(dry_run)? {
                bail!("bucket mirroring failed");
            }
            Ok(())
        }
    }
}

async fn run_everything(batch_size: usize, skip_buckets: bool) -> Result<()> {
    let secret = SecretConfig::from_env()?;
    let tables = config::load_table_configs(&secret)?;

    let summary = sync::run_all(&secret, &tables, batch_size).await;

    // Bucket mirroring still runs when tables failed; partial progress is
    // preserved and the exit code reports the combined outcome.
    let buckets_ok = if skip_buckets {
        true
    } else {
        mirror_configured_buckets(false)?
    };

    if !summary.all_ok() {
        bail!("table syncs failed: {}", summary.failed_tables().join(", "));
    }
    if !buckets_ok {
        bail!("bucket mirroring failed");
    }

    tracing::info!("All syncs completed successfully");
    Ok(())
}

async fn sync_one(name: &str, batch_size: usize) -> Result<()> {
    let secret = SecretConfig::from_env()?;
    let tables = config::load_table_configs(&secret)?;
    let table = tables
        .iter()
        .find(|t| t.table_name == name)
        .with_context(|| format!("table '{}' is not present in any service table config", name))?;
    sync::sync_table(&secret, table, batch_size).await
}

/// Mirror every configured bucket pair. Returns false when any pair failed.
fn mirror_configured_buckets(dry_run: bool) -> Result<bool> {
    let pairs = config::bucket_pairs_from_env()?;
    if pairs.is_empty() {
        tracing::info!("No bucket pairs configured, skipping bucket mirroring");
        return Ok(true);
    }

    let stores: Vec<(DirBucket, DirBucket)> = pairs
        .iter()
        .map(|pair| {
            (
                DirBucket::new(pair.source.as_str()),
                DirBucket::new(pair.dest.as_str()),
            )
        })
        .collect();

    let results = mirror::mirror_all(&stores, dry_run);
    let failed: Vec<&str> = results
        .iter()
        .filter(|(_, outcome)| outcome.is_err())
        .map(|(label, _)| label.as_str())
        .collect();

    if !failed.is_empty() {
        tracing::error!("Some bucket mirrors failed: {}", failed.join(", "));
        return Ok(false);
    }
    tracing::info!("All bucket mirrors completed successfully");
    Ok(true)
}
