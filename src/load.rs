// Load stage: latest snapshot blob -> flattened rows -> staging table -> MERGE

use crate::error::{EtlError, EtlResult};
use crate::extract::KeyResolution;
use crate::models::{MatchDocument, MatchStatRow, RiotId, Roster, Snapshot};
use crate::riot::MatchSource;
use crate::storage::{latest_blob, BlobStore, NDJSON_CONTENT_TYPE};
use crate::warehouse::{MergeKey, MergeSpec, RowKey, TableRef, Warehouse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

pub const STAGING_BLOB_PREFIX: &str = "staging/";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub snapshot_prefix: String,
    pub target: TableRef,
    pub staging: TableRef,
    pub merge_key: MergeKey,
    pub key_resolution: KeyResolution,
    /// Drop rows whose key is already in the permanent table before staging.
    pub skip_existing: bool,
    /// Also write the rows as NDJSON under `staging/` until the merge completes.
    pub stage_blob: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub blob_name: String,
    pub rows_processed: usize,
    /// Matches with no participant entry for the player (or players with no key)
    pub skipped: usize,
    /// Rows collapsed because their key repeated within the snapshot
    pub duplicates: usize,
    /// Rows filtered because the permanent table already had them
    pub already_loaded: usize,
    pub merged: u64,
}

impl LoadReport {
    pub fn message(&self) -> String {
        if self.rows_processed == 0 {
            "No new rows to load".to_string()
        } else {
            format!(
                "Processed {} rows, merged into warehouse",
                self.rows_processed
            )
        }
    }
}

#[derive(Debug, Default)]
pub struct Flattened {
    pub rows: Vec<MatchStatRow>,
    pub skipped: usize,
}

/// Flatten one player's matches. Matches without the player's participant
/// entry are skipped with a warning.
pub fn flatten_player(player: &str, puuid: &str, matches: &[Value]) -> EtlResult<Flattened> {
    let mut out = Flattened::default();
    for raw in matches {
        let doc = MatchDocument::deserialize(raw)
            .map_err(|e| EtlError::Snapshot(format!("match document for {player}: {e}")))?;
        let Some(participant) = doc.participant(puuid) else {
            warn!(
                player,
                match_id = %doc.metadata.match_id,
                "player not among match participants; skipping"
            );
            out.skipped += 1;
            continue;
        };
        let row = MatchStatRow::from_participant(player, &doc, participant).ok_or_else(|| {
            EtlError::Snapshot(format!(
                "match {} has out-of-range gameCreation {}",
                doc.metadata.match_id, doc.info.game_creation
            ))
        })?;
        out.rows.push(row);
    }
    Ok(out)
}

/// Flatten every player in the snapshot. Players without a key are skipped.
pub fn flatten_snapshot(snapshot: &Snapshot, keys: &HashMap<String, String>) -> EtlResult<Flattened> {
    let mut out = Flattened::default();
    for (player, matches) in snapshot {
        let Some(puuid) = keys.get(player) else {
            warn!(%player, matches = matches.len(), "no key for player; skipping its matches");
            out.skipped += matches.len();
            continue;
        };
        let f = flatten_player(player, puuid, matches)?;
        out.rows.extend(f.rows);
        out.skipped += f.skipped;
    }
    Ok(out)
}

/// Keep the first row per key. Returns the number of rows removed.
pub fn dedupe(rows: &mut Vec<MatchStatRow>, key: MergeKey) -> usize {
    let before = rows.len();
    let mut seen: HashSet<RowKey> = HashSet::with_capacity(before);
    rows.retain(|r| seen.insert(key.key_of(r)));
    before - rows.len()
}

/// Map each snapshot player to its opaque key.
async fn player_keys(
    snapshot: &Snapshot,
    roster: &Roster,
    mode: KeyResolution,
    source: Option<&dyn MatchSource>,
) -> EtlResult<HashMap<String, String>> {
    let mut keys = HashMap::with_capacity(snapshot.len());
    match mode {
        KeyResolution::Static => {
            for player in snapshot.keys() {
                if let Some(k) = roster.puuid_for(player) {
                    keys.insert(player.clone(), k.to_string());
                }
            }
        }
        KeyResolution::Live => {
            let source = source.ok_or_else(|| {
                EtlError::config("live key resolution requires a Riot API client")
            })?;
            for player in snapshot.keys() {
                let riot_id: RiotId = player.parse()?;
                keys.insert(player.clone(), source.account_puuid(&riot_id).await?);
            }
        }
    }
    Ok(keys)
}

fn to_ndjson(rows: &[MatchStatRow]) -> EtlResult<Bytes> {
    let mut buf = Vec::with_capacity(rows.len() * 160);
    for row in rows {
        serde_json::to_writer(&mut buf, row)
            .map_err(|e| EtlError::Snapshot(format!("serialize row: {e}")))?;
        buf.push(b'\n');
    }
    Ok(Bytes::from(buf))
}

fn staging_blob_name(snapshot_name: &str) -> String {
    let stem = snapshot_name.strip_suffix(".json").unwrap_or(snapshot_name);
    format!("{STAGING_BLOB_PREFIX}{stem}.ndjson")
}

/// Full load against the most recent snapshot.
///
/// A failure after the staging table is created leaves it behind; the next
/// run drops and recreates it.
#[instrument(skip_all, fields(run_id = %uuid::Uuid::new_v4(), target_table = %opts.target, merge_key = ?opts.merge_key))]
pub async fn run_load(
    store: &dyn BlobStore,
    warehouse: &dyn Warehouse,
    roster: &Roster,
    source: Option<&dyn MatchSource>,
    opts: &LoadOptions,
) -> EtlResult<LoadReport> {
    let latest = latest_blob(store, &opts.snapshot_prefix).await?;
    info!(blob = %latest.name, created = %latest.created, "loading latest snapshot");
    let body = store.get(&latest.name).await?;
    let snapshot: Snapshot = serde_json::from_slice(&body)
        .map_err(|e| EtlError::Snapshot(format!("{}: {e}", latest.name)))?;

    let keys = player_keys(&snapshot, roster, opts.key_resolution, source).await?;
    let Flattened { mut rows, skipped } = flatten_snapshot(&snapshot, &keys)?;
    let duplicates = dedupe(&mut rows, opts.merge_key);

    let mut report = LoadReport {
        blob_name: latest.name.clone(),
        skipped,
        duplicates,
        ..LoadReport::default()
    };

    if rows.is_empty() {
        info!(skipped, duplicates, "no new rows to load");
        return Ok(report);
    }

    let schema = MatchStatRow::schema();
    let target_schema = schema.clone().with_primary_key(opts.merge_key.columns());
    warehouse.ensure_table(&opts.target, &target_schema).await?;

    if opts.skip_existing {
        let mut match_ids: Vec<String> = rows.iter().map(|r| r.match_id.clone()).collect();
        match_ids.sort();
        match_ids.dedup();
        let existing = warehouse
            .existing_keys(&opts.target, opts.merge_key, &match_ids)
            .await?;
        let before = rows.len();
        rows.retain(|r| !existing.contains(&opts.merge_key.key_of(r)));
        report.already_loaded = before - rows.len();
    }

    if rows.is_empty() {
        info!(already_loaded = report.already_loaded, "all rows already loaded");
        return Ok(report);
    }

    let staged_blob = if opts.stage_blob {
        let name = staging_blob_name(&latest.name);
        store.put(&name, to_ndjson(&rows)?, NDJSON_CONTENT_TYPE).await?;
        Some(name)
    } else {
        None
    };

    warehouse.recreate_table(&opts.staging, &schema).await?;
    warehouse.insert_rows(&opts.staging, &rows).await?;
    let merged = warehouse
        .merge(&MergeSpec {
            target: opts.target.clone(),
            staging: opts.staging.clone(),
            schema,
            key: opts.merge_key,
        })
        .await?;
    warehouse.drop_table(&opts.staging).await?;
    if let Some(name) = staged_blob {
        store.delete(&name).await?;
    }

    report.rows_processed = rows.len();
    report.merged = merged;
    info!(
        rows = report.rows_processed,
        merged,
        skipped,
        duplicates,
        already_loaded = report.already_loaded,
        "load complete"
    );
    Ok(report)
}
