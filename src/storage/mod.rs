//! Blob storage for extract snapshots.

pub mod gcs;
pub mod local;

pub use gcs::{GcsAuth, GcsBlobStore, DEFAULT_GCS_BASE_URL};
pub use local::LocalBlobStore;

use crate::error::{EtlError, EtlResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub name: String,
    pub created: DateTime<Utc>,
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object, replacing any existing one. Returns its URI.
    async fn put(&self, name: &str, body: Bytes, content_type: &str) -> EtlResult<String>;

    /// All objects whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> EtlResult<Vec<BlobMeta>>;

    async fn get(&self, name: &str) -> EtlResult<Bytes>;

    async fn delete(&self, name: &str) -> EtlResult<()>;

    fn uri(&self, name: &str) -> String;
}

/// Most recently created blob under `prefix`; ties go to the greater name.
pub async fn latest_blob(store: &dyn BlobStore, prefix: &str) -> EtlResult<BlobMeta> {
    let blobs = store.list(prefix).await?;
    pick_latest(blobs)
        .ok_or_else(|| EtlError::storage(format!("no snapshots found under prefix {prefix:?}")))
}

fn pick_latest(blobs: Vec<BlobMeta>) -> Option<BlobMeta> {
    blobs
        .into_iter()
        .max_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)))
}
