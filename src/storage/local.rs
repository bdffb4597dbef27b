use super::{BlobMeta, BlobStore};
use crate::error::{EtlError, EtlResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Directory-backed blob store. Object names map to relative paths.
///
/// A relative root is resolved against the working directory at construction,
/// so `uri` always yields an absolute `file://` URI. An object's creation time
/// is its file modification time, which advances when `put` overwrites it.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> EtlResult<PathBuf> {
        let rel = Path::new(name);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !safe {
            return Err(EtlError::storage(format!("invalid object name {name:?}")));
        }
        Ok(self.root.join(rel))
    }

    fn name_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, name: &str, body: Bytes, _content_type: &str) -> EtlResult<String> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| EtlError::storage(format!("create {}: {e}", parent.display())))?;
        }
        fs::write(&path, &body)
            .await
            .map_err(|e| EtlError::storage(format!("write {}: {e}", path.display())))?;
        info!(path = %path.display(), size = body.len(), "wrote object");
        Ok(self.uri(name))
    }

    async fn list(&self, prefix: &str) -> EtlResult<Vec<BlobMeta>> {
        let mut out = Vec::new();
        if fs::metadata(&self.root).await.is_err() {
            return Ok(out);
        }
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| EtlError::storage(format!("read dir {}: {e}", dir.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| EtlError::storage(format!("read dir {}: {e}", dir.display())))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| EtlError::storage(format!("stat {}: {e}", path.display())))?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(name) = self.name_for(&path) else {
                    continue;
                };
                if !name.starts_with(prefix) {
                    continue;
                }
                let created = meta
                    .modified()
                    .map_err(|e| EtlError::storage(format!("stat {}: {e}", path.display())))?;
                out.push(BlobMeta {
                    name,
                    created: DateTime::<Utc>::from(created),
                    size: meta.len(),
                });
            }
        }
        debug!(root = %self.root.display(), prefix, count = out.len(), "listed objects");
        Ok(out)
    }

    async fn get(&self, name: &str) -> EtlResult<Bytes> {
        let path = self.path_for(name)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| EtlError::storage(format!("read {}: {e}", path.display())))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, name: &str) -> EtlResult<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EtlError::storage(format!("remove {}: {e}", path.display()))),
        }
    }

    fn uri(&self, name: &str) -> String {
        format!("file://{}", self.root.join(name).display())
    }
}
