use super::{BlobMeta, BlobStore};
use crate::error::{EtlError, EtlResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_GCS_BASE_URL: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// How requests to the storage API are authorized.
#[derive(Debug, Clone)]
pub enum GcsAuth {
    /// Fixed bearer token (e.g. `gcloud auth print-access-token`)
    Static(String),
    /// Service-account token from the instance metadata server
    Metadata,
    /// No Authorization header (local emulators)
    Anonymous,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    time_created: DateTime<Utc>,
    /// The JSON API encodes uint64 as a string.
    #[serde(default)]
    size: Option<String>,
}

impl From<ObjectResource> for BlobMeta {
    fn from(o: ObjectResource) -> Self {
        BlobMeta {
            size: o.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            name: o.name,
            created: o.time_created,
        }
    }
}

/// Google Cloud Storage bucket accessed through the JSON API.
pub struct GcsBlobStore {
    base_url: String,
    bucket: String,
    auth: GcsAuth,
    http: Client,
    cached_token: Mutex<Option<(String, Instant)>>,
}

impl GcsBlobStore {
    pub fn new(base_url: &str, bucket: impl Into<String>, auth: GcsAuth) -> EtlResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EtlError::storage(format!("build gcs http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            auth,
            http,
            cached_token: Mutex::new(None),
        })
    }

    fn upload_url(&self, name: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            self.bucket,
            urlencoding::encode(name)
        )
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket)
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(name)
        )
    }

    async fn bearer(&self) -> EtlResult<Option<String>> {
        match &self.auth {
            GcsAuth::Static(token) => Ok(Some(token.clone())),
            GcsAuth::Anonymous => Ok(None),
            GcsAuth::Metadata => {
                let mut guard = self.cached_token.lock().await;
                if let Some((token, expires)) = guard.as_ref() {
                    if Instant::now() < *expires {
                        return Ok(Some(token.clone()));
                    }
                }
                let resp = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| EtlError::storage(format!("metadata token request: {e}")))?;
                if !resp.status().is_success() {
                    return Err(EtlError::storage(format!(
                        "metadata token request returned {}",
                        resp.status()
                    )));
                }
                let token: MetadataToken = resp
                    .json()
                    .await
                    .map_err(|e| EtlError::storage(format!("metadata token decode: {e}")))?;
                // refresh a minute early
                let ttl = Duration::from_secs(token.expires_in.saturating_sub(60));
                *guard = Some((token.access_token.clone(), Instant::now() + ttl));
                debug!(ttl_secs = ttl.as_secs(), "refreshed gcs access token");
                Ok(Some(token.access_token))
            }
        }
    }

    async fn authorized(&self, req: RequestBuilder) -> EtlResult<RequestBuilder> {
        Ok(match self.bearer().await? {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn send(&self, op: &str, req: RequestBuilder) -> EtlResult<reqwest::Response> {
        let resp = self
            .authorized(req)
            .await?
            .send()
            .await
            .map_err(|e| EtlError::storage(format!("gcs {op}: {e}")))?;
        Ok(resp)
    }

    async fn fail(op: &str, resp: reqwest::Response) -> EtlError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        EtlError::storage(format!("gcs {op} returned {status}: {body}"))
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, name: &str, body: Bytes, content_type: &str) -> EtlResult<String> {
        let size = body.len();
        let req = self
            .http
            .post(self.upload_url(name))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        let resp = self.send("upload", req).await?;
        if !resp.status().is_success() {
            return Err(Self::fail("upload", resp).await);
        }
        info!(bucket = %self.bucket, name, size, "uploaded object");
        Ok(self.uri(name))
    }

    async fn list(&self, prefix: &str) -> EtlResult<Vec<BlobMeta>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self.http.get(self.list_url()).query(&[
                ("prefix", prefix),
                ("fields", "items(name,timeCreated,size),nextPageToken"),
            ]);
            if let Some(tok) = page_token.as_deref() {
                req = req.query(&[("pageToken", tok)]);
            }
            let resp = self.send("list", req).await?;
            if !resp.status().is_success() {
                return Err(Self::fail("list", resp).await);
            }
            let page: ListPage = resp
                .json()
                .await
                .map_err(|e| EtlError::storage(format!("gcs list decode: {e}")))?;
            out.extend(page.items.into_iter().map(BlobMeta::from));
            match page.next_page_token {
                Some(tok) if !tok.is_empty() => page_token = Some(tok),
                _ => break,
            }
        }
        debug!(bucket = %self.bucket, prefix, count = out.len(), "listed objects");
        Ok(out)
    }

    async fn get(&self, name: &str) -> EtlResult<Bytes> {
        let req = self.http.get(self.object_url(name)).query(&[("alt", "media")]);
        let resp = self.send("download", req).await?;
        if !resp.status().is_success() {
            return Err(Self::fail("download", resp).await);
        }
        resp.bytes()
            .await
            .map_err(|e| EtlError::storage(format!("gcs download body: {e}")))
    }

    async fn delete(&self, name: &str) -> EtlResult<()> {
        let req = self.http.delete(self.object_url(name));
        let resp = self.send("delete", req).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            warn!(bucket = %self.bucket, name, "delete: object already gone");
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(Self::fail("delete", resp).await);
        }
        Ok(())
    }

    fn uri(&self, name: &str) -> String {
        format!("gs://{}/{}", self.bucket, name)
    }
}
