// Extract stage: roster -> Riot API -> snapshot blob

use crate::error::{EtlError, EtlResult};
use crate::models::{snapshot_blob_name, Roster, RosterEntry, Snapshot};
use crate::riot::MatchSource;
use crate::storage::{BlobStore, JSON_CONTENT_TYPE};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;
use tracing::{info, instrument};

pub const DEFAULT_SNAPSHOT_PREFIX: &str = "t1_riot_data_";
pub const DEFAULT_MATCH_COUNT: u32 = 5;

/// Where opaque player keys come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyResolution {
    /// Keys are read from the roster; missing keys are a configuration error.
    #[default]
    Static,
    /// Keys are looked up through the account endpoint on every run.
    Live,
}

impl FromStr for KeyResolution {
    type Err = EtlError;

    fn from_str(s: &str) -> EtlResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "live" => Ok(Self::Live),
            other => Err(EtlError::config(format!("unknown key resolution {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub match_count: u32,
    pub snapshot_prefix: String,
    pub key_resolution: KeyResolution,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            match_count: DEFAULT_MATCH_COUNT,
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.to_string(),
            key_resolution: KeyResolution::Static,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub blob_uri: String,
    pub blob_name: String,
    pub players: usize,
    pub matches: usize,
}

/// Reject rosters that cannot be extracted before any API call is made.
pub fn validate_roster(roster: &Roster, mode: KeyResolution) -> EtlResult<()> {
    if roster.is_empty() {
        return Err(EtlError::config("player roster is empty"));
    }
    if mode == KeyResolution::Static {
        let missing: Vec<String> = roster
            .entries()
            .iter()
            .filter(|e| e.puuid.is_none())
            .map(|e| e.riot_id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(EtlError::config(format!(
                "static key resolution but no key configured for {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}

/// Opaque key for one roster entry under the given mode.
pub async fn resolve_puuid(
    entry: &RosterEntry,
    mode: KeyResolution,
    source: &dyn MatchSource,
) -> EtlResult<String> {
    match (mode, entry.puuid.as_deref()) {
        (KeyResolution::Static, Some(key)) => Ok(key.to_string()),
        (KeyResolution::Static, None) => Err(EtlError::config(format!(
            "no key configured for {}",
            entry.riot_id
        ))),
        (KeyResolution::Live, _) => source.account_puuid(&entry.riot_id).await,
    }
}

/// Fetch every player's recent matches, one call at a time.
/// The first failure aborts; nothing collected so far is returned.
pub async fn collect_snapshot(
    roster: &Roster,
    source: &dyn MatchSource,
    opts: &ExtractOptions,
) -> EtlResult<Snapshot> {
    validate_roster(roster, opts.key_resolution)?;
    let mut snapshot = Snapshot::with_capacity(roster.len());
    for entry in roster.entries() {
        let player = entry.riot_id.to_string();
        let puuid = resolve_puuid(entry, opts.key_resolution, source).await?;
        let match_ids = source.recent_match_ids(&puuid, opts.match_count).await?;
        let mut matches = Vec::with_capacity(match_ids.len());
        for match_id in &match_ids {
            matches.push(source.match_detail(match_id).await?);
        }
        info!(%player, matches = matches.len(), "collected player matches");
        snapshot.insert(player, matches);
    }
    Ok(snapshot)
}

/// Full extract: collect, serialize and upload under a timestamped name.
#[instrument(skip_all, fields(run_id = %uuid::Uuid::new_v4(), players = roster.len(), match_count = opts.match_count))]
pub async fn run_extract(
    roster: &Roster,
    source: &dyn MatchSource,
    store: &dyn BlobStore,
    opts: &ExtractOptions,
) -> EtlResult<ExtractReport> {
    let snapshot = collect_snapshot(roster, source, opts).await?;
    let matches: usize = snapshot.values().map(Vec::len).sum();
    let body = serde_json::to_vec(&snapshot)
        .map_err(|e| EtlError::Snapshot(format!("serialize snapshot: {e}")))?;

    let blob_name = snapshot_blob_name(&opts.snapshot_prefix, Utc::now());
    let blob_uri = store
        .put(&blob_name, Bytes::from(body), JSON_CONTENT_TYPE)
        .await?;
    info!(%blob_uri, players = snapshot.len(), matches, "snapshot uploaded");

    Ok(ExtractReport {
        blob_uri,
        blob_name,
        players: snapshot.len(),
        matches,
    })
}
