// Extract service: GET /fetch-stats pulls recent matches for the roster and
// uploads a snapshot blob.

use anyhow::Result;
use rift_etl::api::{routes, ApiServer, ExtractState};
use rift_etl::config::ExtractConfig;
use rift_etl::logging::{init_tracing, DEFAULT_FILTER};
use rift_etl::util::env as env_util;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    env_util::preflight_check(
        "extract_server",
        &["RIOT_API_KEY"],
        &[
            "REGION",
            "RIOT_API_BASE_URL",
            "RIOT_API_KEY",
            "BLOB_BACKEND",
            "GCS_BUCKET",
            "BLOB_DIR",
            "KEY_RESOLUTION",
            "MATCH_COUNT",
            "ROSTER_FILE",
            "API_SECRET",
        ],
    )?;

    let server = ApiServer::from_env()?;
    let cfg = ExtractConfig::from_env()?;
    tracing::info!(
        players = cfg.roster.len(),
        key_resolution = ?cfg.options.key_resolution,
        "extract configuration loaded"
    );

    let state = actix_web::web::Data::new(ExtractState {
        source: Arc::new(cfg.riot.client()?),
        store: cfg.blob.open_store()?,
        roster: cfg.roster,
        options: cfg.options,
    });

    server
        .run("extract", routes::configure_extract(state))
        .await
}
