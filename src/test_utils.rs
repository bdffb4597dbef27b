//! In-memory doubles for the pipeline seams.

use crate::error::{EtlError, EtlResult};
use crate::models::{MatchStatRow, RiotId};
use crate::riot::MatchSource;
use crate::storage::{BlobMeta, BlobStore};
use crate::warehouse::{MergeKey, MergeSpec, RowKey, TableRef, TableSchema, Warehouse};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Blob store keeping objects in a map. `put` stamps increasing creation times.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    clock: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn insert_at(&self, name: &str, body: &[u8], created_secs: i64) {
        let created = Utc.timestamp_opt(created_secs, 0).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (Bytes::copy_from_slice(body), created));
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn body(&self, name: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(name).map(|(b, _)| b.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, body: Bytes, _content_type: &str) -> EtlResult<String> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        let created = Utc.timestamp_opt(1_700_000_000 + tick, 0).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (body, created));
        Ok(self.uri(name))
    }

    async fn list(&self, prefix: &str) -> EtlResult<Vec<BlobMeta>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, (body, created))| BlobMeta {
                name: name.clone(),
                created: *created,
                size: body.len() as u64,
            })
            .collect())
    }

    async fn get(&self, name: &str) -> EtlResult<Bytes> {
        self.body(name)
            .ok_or_else(|| EtlError::storage(format!("no such object {name}")))
    }

    async fn delete(&self, name: &str) -> EtlResult<()> {
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }

    fn uri(&self, name: &str) -> String {
        format!("mem://bucket/{name}")
    }
}

/// Warehouse double with upsert semantics matching the rendered MERGE.
#[derive(Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, Vec<MatchStatRow>>>,
    ops: Mutex<Vec<String>>,
    pub fail_merge: bool,
}

impl MemoryWarehouse {
    pub fn failing_merge() -> Self {
        Self {
            fail_merge: true,
            ..Self::default()
        }
    }

    pub fn rows(&self, table: &TableRef) -> Option<Vec<MatchStatRow>> {
        self.tables.lock().unwrap().get(&table.to_string()).cloned()
    }

    pub fn has_table(&self, table: &TableRef) -> bool {
        self.tables.lock().unwrap().contains_key(&table.to_string())
    }

    pub fn seed(&self, table: &TableRef, rows: Vec<MatchStatRow>) {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn log(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_table(&self, table: &TableRef, _schema: &TableSchema) -> EtlResult<()> {
        self.log(format!("ensure {table}"));
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn recreate_table(&self, table: &TableRef, _schema: &TableSchema) -> EtlResult<()> {
        self.log(format!("recreate {table}"));
        self.tables
            .lock()
            .unwrap()
            .insert(table.to_string(), Vec::new());
        Ok(())
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[MatchStatRow]) -> EtlResult<u64> {
        self.log(format!("insert {table} {}", rows.len()));
        let mut tables = self.tables.lock().unwrap();
        let t = tables
            .get_mut(&table.to_string())
            .ok_or_else(|| EtlError::warehouse(format!("table {table} not found")))?;
        t.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn merge(&self, spec: &MergeSpec) -> EtlResult<u64> {
        self.log(format!("merge {} <- {}", spec.target, spec.staging));
        if self.fail_merge {
            return Err(EtlError::warehouse("merge rejected"));
        }
        let mut tables = self.tables.lock().unwrap();
        let staged = tables
            .get(&spec.staging.to_string())
            .cloned()
            .ok_or_else(|| EtlError::warehouse(format!("table {} not found", spec.staging)))?;
        let target = tables
            .get_mut(&spec.target.to_string())
            .ok_or_else(|| EtlError::warehouse(format!("table {} not found", spec.target)))?;
        let mut touched: HashSet<RowKey> = HashSet::new();
        for row in staged {
            let key = spec.key.key_of(&row);
            if !touched.insert(key.clone()) {
                return Err(EtlError::warehouse(
                    "MERGE command cannot affect row a second time",
                ));
            }
            match target.iter_mut().find(|r| spec.key.key_of(r) == key) {
                Some(existing) => *existing = row,
                None => target.push(row),
            }
        }
        Ok(touched.len() as u64)
    }

    async fn existing_keys(
        &self,
        table: &TableRef,
        key: MergeKey,
        match_ids: &[String],
    ) -> EtlResult<HashSet<RowKey>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(&table.to_string())
            .map(|rows| {
                rows.iter()
                    .filter(|r| match_ids.contains(&r.match_id))
                    .map(|r| key.key_of(r))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn drop_table(&self, table: &TableRef) -> EtlResult<()> {
        self.log(format!("drop {table}"));
        self.tables.lock().unwrap().remove(&table.to_string());
        Ok(())
    }
}

/// Canned API responses keyed by display id, puuid and match id.
#[derive(Default)]
pub struct ScriptedSource {
    pub accounts: HashMap<String, String>,
    pub match_lists: HashMap<String, Vec<String>>,
    pub details: HashMap<String, Value>,
    /// Match id whose detail call answers with this status
    pub failing_match: Option<(String, u16)>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn with_player(mut self, riot_id: &str, puuid: &str, matches: &[(&str, Value)]) -> Self {
        self.accounts.insert(riot_id.to_string(), puuid.to_string());
        self.match_lists.insert(
            puuid.to_string(),
            matches.iter().map(|(id, _)| id.to_string()).collect(),
        );
        for (id, doc) in matches {
            self.details.insert(id.to_string(), doc.clone());
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn not_found(endpoint: &str) -> EtlError {
        EtlError::Upstream {
            endpoint: endpoint.to_string(),
            status: 404,
            body: "not found".into(),
        }
    }
}

#[async_trait]
impl MatchSource for ScriptedSource {
    async fn account_puuid(&self, riot_id: &RiotId) -> EtlResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.accounts
            .get(&riot_id.to_string())
            .cloned()
            .ok_or_else(|| Self::not_found("account-by-riot-id"))
    }

    async fn recent_match_ids(&self, puuid: &str, count: u32) -> EtlResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids = self
            .match_lists
            .get(puuid)
            .ok_or_else(|| Self::not_found("match-ids-by-puuid"))?;
        Ok(ids.iter().take(count as usize).cloned().collect())
    }

    async fn match_detail(&self, match_id: &str) -> EtlResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((id, status)) = &self.failing_match {
            if id == match_id {
                return Err(EtlError::Upstream {
                    endpoint: "match-detail".into(),
                    status: *status,
                    body: String::new(),
                });
            }
        }
        self.details
            .get(match_id)
            .cloned()
            .ok_or_else(|| Self::not_found("match-detail"))
    }
}

/// Minimal match document with the given participants `(puuid, champion, k, d, a, win)`.
pub fn match_doc(
    match_id: &str,
    created_ms: i64,
    participants: &[(&str, &str, i64, i64, i64, bool)],
) -> Value {
    let parts: Vec<Value> = participants
        .iter()
        .map(|(puuid, champ, k, d, a, win)| {
            json!({
                "puuid": puuid,
                "championName": champ,
                "kills": k,
                "deaths": d,
                "assists": a,
                "win": win,
            })
        })
        .collect();
    json!({
        "metadata": {"matchId": match_id},
        "info": {
            "gameCreation": created_ms,
            "gameDuration": 1800,
            "participants": parts,
        }
    })
}
