// Load service: GET /load-to-bigquery merges the newest snapshot into the
// warehouse table.

use anyhow::{Context, Result};
use rift_etl::api::{routes, ApiServer, LoadState};
use rift_etl::config::LoadConfig;
use rift_etl::logging::{init_tracing, DEFAULT_FILTER};
use rift_etl::riot::MatchSource;
use rift_etl::util::env as env_util;
use rift_etl::warehouse::PgWarehouse;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    env_util::preflight_check(
        "load_server",
        &[],
        &[
            "DATABASE_URL",
            "DB_MAX_CONNS",
            "WAREHOUSE_SCHEMA",
            "BQ_TABLE",
            "STAGING_TABLE",
            "MERGE_KEY",
            "BLOB_BACKEND",
            "GCS_BUCKET",
            "BLOB_DIR",
            "KEY_RESOLUTION",
            "LOAD_SKIP_EXISTING",
            "LOAD_STAGE_BLOB",
            "API_SECRET",
        ],
    )?;

    let server = ApiServer::from_env()?;
    let cfg = LoadConfig::from_env()?;
    let database_url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL is required")?;
    let warehouse = PgWarehouse::connect(database_url, cfg.db_max_conns).await?;

    let source: Option<Arc<dyn MatchSource>> = match &cfg.riot {
        Some(riot) => Some(Arc::new(riot.client()?) as Arc<dyn MatchSource>),
        None => None,
    };

    let state = actix_web::web::Data::new(LoadState {
        store: cfg.blob.open_store()?,
        warehouse: Arc::new(warehouse),
        source,
        roster: cfg.roster,
        options: cfg.options,
    });

    server.run("load", routes::configure_load(state)).await
}
