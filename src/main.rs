use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rift_etl::config::{load_roster, BlobConfig, ExtractConfig, LoadConfig};
use rift_etl::load::flatten_snapshot;
use rift_etl::logging::{init_tracing, DEFAULT_FILTER};
use rift_etl::models::Snapshot;
use rift_etl::riot::MatchSource;
use rift_etl::storage::latest_blob;
use rift_etl::util::env as env_util;
use rift_etl::warehouse::PgWarehouse;
use rift_etl::{run_extract, run_load};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rift", version, about = "Match stats ETL admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch recent matches for the roster and upload one snapshot
    Extract,
    /// Merge the newest snapshot into the warehouse
    Load {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Print the name of the newest snapshot blob
    Latest,
    /// Flatten a snapshot file to NDJSON rows on stdout (static keys only)
    Flatten {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract => {
            let cfg = ExtractConfig::from_env()?;
            let client = cfg.riot.client()?;
            let store = cfg.blob.open_store()?;
            let report = run_extract(&cfg.roster, &client, store.as_ref(), &cfg.options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Load { db_url } => {
            let cfg = LoadConfig::from_env()?;
            let url = db_url
                .or_else(|| cfg.database_url.clone())
                .context("no database URL: pass --db-url or set DATABASE_URL")?;
            let warehouse = PgWarehouse::connect(&url, cfg.db_max_conns).await?;
            let store = cfg.blob.open_store()?;
            let client = cfg.riot.as_ref().map(|r| r.client()).transpose()?;
            let source = client.as_ref().map(|c| c as &dyn MatchSource);
            let report = run_load(store.as_ref(), &warehouse, &cfg.roster, source, &cfg.options)
                .await?;
            info!(message = %report.message(), "load finished");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Latest => {
            let blob = BlobConfig::from_env()?;
            let store = blob.open_store()?;
            let meta = latest_blob(store.as_ref(), &blob.snapshot_prefix).await?;
            println!("{}\t{}\t{}", meta.name, meta.created.to_rfc3339(), meta.size);
        }
        Commands::Flatten { file } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("reading snapshot {}", file.display()))?;
            let snapshot: Snapshot = serde_json::from_slice(&raw)
                .with_context(|| format!("parsing snapshot {}", file.display()))?;
            let roster = load_roster()?;
            let keys: HashMap<String, String> = roster
                .entries()
                .iter()
                .filter_map(|e| e.puuid.clone().map(|k| (e.riot_id.to_string(), k)))
                .collect();
            let flat = flatten_snapshot(&snapshot, &keys)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for row in &flat.rows {
                serde_json::to_writer(&mut out, row)?;
                out.write_all(b"\n")?;
            }
            info!(rows = flat.rows.len(), skipped = flat.skipped, "flattened snapshot");
        }
    }
    Ok(())
}
