use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sam_sync::{
    group_batches, load_directory, CachedLookup, HoldingBatch, InMemoryReferenceData, SqliteStore, SyncConfig,
    SyncPipeline,
};

/// Sync SAM livestock-registry extracts into the Site / Party model
#[derive(Parser, Debug)]
#[command(name = "sam-sync")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "SAM_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import every extract CSV in a directory
    Import {
        /// Directory holding holdings*.csv, herds*.csv, parties*.csv, holders*.csv, reference_data*.csv
        dir: PathBuf,
    },
    /// Process CPHs as reported empty, removing their silver records
    Purge {
        cphs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sam_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = SyncConfig::load(args.config.as_deref())?;
    if let Some(db) = args.database {
        config.database_path = db;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current stages");
            on_signal.cancel();
        }
    });

    match args.command {
        Command::Import { dir } => run_import(config, dir, &cancel).await,
        Command::Purge { cphs } => {
            let batches = cphs.iter().map(|c| HoldingBatch::empty(c)).collect();
            run(config, InMemoryReferenceData::new(), batches, &cancel).await
        }
    }
}

async fn run_import(config: SyncConfig, dir: PathBuf, cancel: &CancellationToken) -> Result<()> {
    println!("📂 Loading extracts from {}", dir.display());
    let extracts = load_directory(&dir)?;
    println!(
        "✓ {} holdings, {} herds, {} parties, {} holders",
        extracts.holdings.len(),
        extracts.herds.len(),
        extracts.parties.len(),
        extracts.holders.len()
    );

    let mut reference = InMemoryReferenceData::new();
    for path in &extracts.reference_data_files {
        let loaded = reference.load_csv(path)?;
        info!(path = %path.display(), loaded, "Loaded reference data");
    }

    let batches = group_batches(&extracts);
    run(config, reference, batches, cancel).await
}

async fn run(
    config: SyncConfig,
    reference: InMemoryReferenceData,
    batches: Vec<HoldingBatch>,
    cancel: &CancellationToken,
) -> Result<()> {
    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open {}", config.database_path.display()))?,
    );
    let lookup = Arc::new(CachedLookup::new(reference));
    let pipeline = SyncPipeline::new(store.clone(), store, lookup, config);

    println!("🔄 Processing {} holding identifiers", batches.len());
    let results = pipeline.run_batches(batches, cancel).await;

    let mut failed = 0;
    let mut deferred = 0;
    for (cph, result) in &results {
        match result {
            Ok(report) => println!("  ✓ {}", report.summary()),
            Err(e) if e.is_transient() => {
                deferred += 1;
                println!("  ⏳ {}: {}", cph, e);
            }
            Err(e) => {
                failed += 1;
                println!("  ❌ {}: {}", cph, e);
            }
        }
    }

    println!(
        "\n{} units: {} ok, {} deferred, {} failed",
        results.len(),
        results.len() - failed - deferred,
        deferred,
        failed
    );

    if failed + deferred > 0 {
        bail!("{} holding identifiers need reprocessing", failed + deferred);
    }
    Ok(())
}
