//! Environment-driven configuration for the extract and load services.
//!
//! Every service reads `.env` once through [`crate::util::env`]; the structs
//! here only gather and validate values.

use crate::error::EtlError;
use crate::extract::{ExtractOptions, KeyResolution, DEFAULT_MATCH_COUNT, DEFAULT_SNAPSHOT_PREFIX};
use crate::load::LoadOptions;
use crate::models::Roster;
use crate::riot::RiotClient;
use crate::storage::{BlobStore, GcsAuth, GcsBlobStore, LocalBlobStore, DEFAULT_GCS_BASE_URL};
use crate::util::env::{db_url, env_flag, env_opt, env_parse, env_req};
use crate::warehouse::{MergeKey, TableRef};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_BUCKET: &str = "t1dashboard";
pub const DEFAULT_REGION: &str = "asia";
pub const DEFAULT_SCHEMA: &str = "riot_data";
pub const DEFAULT_TABLE: &str = "match_stats";
pub const DEFAULT_STAGING_TABLE: &str = "match_stats_staging";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlobBackend {
    #[default]
    Gcs,
    Local,
}

impl FromStr for BlobBackend {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, EtlError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcs" | "gs" => Ok(Self::Gcs),
            "local" | "fs" => Ok(Self::Local),
            other => Err(EtlError::config(format!("unknown blob backend {other:?}"))),
        }
    }
}

#[derive(Clone)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    pub bucket: String,
    pub gcs_base_url: String,
    pub access_token: Option<String>,
    /// Skip Authorization entirely (emulators)
    pub anonymous: bool,
    pub blob_dir: PathBuf,
    pub snapshot_prefix: String,
}

impl BlobConfig {
    pub fn from_env() -> Result<Self> {
        let backend = match env_opt("BLOB_BACKEND") {
            Some(raw) => raw.parse()?,
            None => BlobBackend::default(),
        };
        Ok(Self {
            backend,
            bucket: env_opt("GCS_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            gcs_base_url: env_opt("GCS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GCS_BASE_URL.to_string()),
            access_token: env_opt("GCS_ACCESS_TOKEN"),
            anonymous: env_flag("GCS_ANONYMOUS", false),
            blob_dir: env_opt("BLOB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./blobs")),
            snapshot_prefix: env_opt("SNAPSHOT_PREFIX")
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PREFIX.to_string()),
        })
    }

    fn gcs_auth(&self) -> GcsAuth {
        match (&self.access_token, self.anonymous) {
            (_, true) => GcsAuth::Anonymous,
            (Some(token), false) => GcsAuth::Static(token.clone()),
            (None, false) => GcsAuth::Metadata,
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn BlobStore>> {
        Ok(match self.backend {
            BlobBackend::Gcs => Arc::new(
                GcsBlobStore::new(&self.gcs_base_url, self.bucket.clone(), self.gcs_auth())
                    .context("building GCS client")?,
            ),
            BlobBackend::Local => Arc::new(LocalBlobStore::new(self.blob_dir.clone())),
        })
    }
}

// No Debug: holds credentials
#[derive(Clone)]
pub struct RiotConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl RiotConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env_opt("RIOT_API_BASE_URL").unwrap_or_else(|| {
            let region = env_opt("REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
            RiotClient::regional_base_url(&region)
        });
        Ok(Self {
            base_url,
            api_key: env_req("RIOT_API_KEY")?,
            timeout_secs: env_parse("RIOT_TIMEOUT_SECS", 20u64),
        })
    }

    pub fn client(&self) -> Result<RiotClient> {
        Ok(RiotClient::new(
            &self.base_url,
            self.api_key.clone(),
            self.timeout_secs,
        )?)
    }
}

fn key_resolution() -> Result<KeyResolution> {
    Ok(match env_opt("KEY_RESOLUTION") {
        Some(raw) => raw.parse()?,
        None => KeyResolution::default(),
    })
}

/// Build a roster from a JSON file path or an inline `Name#Tag=key;...` list.
/// The file wins when both are given.
pub fn roster_from_sources(file: Option<&str>, inline: Option<&str>) -> Result<Roster> {
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading roster file {path}"))?;
        return Ok(Roster::parse_json(&raw)?);
    }
    match inline {
        Some(raw) => Ok(Roster::parse_pairs(raw)?),
        None => Ok(Roster::default()),
    }
}

/// Roster from `ROSTER_FILE` or `PLAYER_ROSTER`; empty when neither is set.
pub fn load_roster() -> Result<Roster> {
    roster_from_sources(
        env_opt("ROSTER_FILE").as_deref(),
        env_opt("PLAYER_ROSTER").as_deref(),
    )
}

#[derive(Clone)]
pub struct ExtractConfig {
    pub roster: Roster,
    pub riot: RiotConfig,
    pub blob: BlobConfig,
    pub options: ExtractOptions,
}

impl ExtractConfig {
    pub fn from_env() -> Result<Self> {
        let blob = BlobConfig::from_env()?;
        let options = ExtractOptions {
            match_count: env_parse("MATCH_COUNT", DEFAULT_MATCH_COUNT),
            snapshot_prefix: blob.snapshot_prefix.clone(),
            key_resolution: key_resolution()?,
        };
        let roster = load_roster()?;
        crate::extract::validate_roster(&roster, options.key_resolution)?;
        Ok(Self {
            roster,
            riot: RiotConfig::from_env()?,
            blob,
            options,
        })
    }
}

#[derive(Clone)]
pub struct LoadConfig {
    pub roster: Roster,
    pub blob: BlobConfig,
    /// `DATABASE_URL` (or `DB_URL`); the CLI may supply its own
    pub database_url: Option<String>,
    pub db_max_conns: u32,
    /// Present only for live key resolution
    pub riot: Option<RiotConfig>,
    pub options: LoadOptions,
}

impl LoadConfig {
    pub fn from_env() -> Result<Self> {
        let blob = BlobConfig::from_env()?;
        let schema = env_opt("WAREHOUSE_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        let table = env_opt("BQ_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        let staging =
            env_opt("STAGING_TABLE").unwrap_or_else(|| DEFAULT_STAGING_TABLE.to_string());
        let merge_key = match env_opt("MERGE_KEY") {
            Some(raw) => raw.parse()?,
            None => MergeKey::default(),
        };
        let key_resolution = key_resolution()?;

        let roster = load_roster()?;
        let riot = match key_resolution {
            KeyResolution::Live => Some(RiotConfig::from_env()?),
            KeyResolution::Static => {
                if roster.is_empty() {
                    return Err(EtlError::config(
                        "static key resolution needs ROSTER_FILE or PLAYER_ROSTER",
                    )
                    .into());
                }
                None
            }
        };

        let options = LoadOptions {
            snapshot_prefix: blob.snapshot_prefix.clone(),
            target: TableRef::new(&schema, &table)?,
            staging: TableRef::new(&schema, &staging)?,
            merge_key,
            key_resolution,
            skip_existing: env_flag("LOAD_SKIP_EXISTING", false),
            stage_blob: env_flag("LOAD_STAGE_BLOB", false),
        };
        if options.target == options.staging {
            return Err(EtlError::config("staging table must differ from target table").into());
        }

        Ok(Self {
            roster,
            blob,
            database_url: db_url().ok(),
            db_max_conns: env_parse("DB_MAX_CONNS", 5u32),
            riot,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!("GCS".parse::<BlobBackend>().unwrap(), BlobBackend::Gcs);
        assert_eq!("local".parse::<BlobBackend>().unwrap(), BlobBackend::Local);
        assert!("s3".parse::<BlobBackend>().is_err());
    }

    #[test]
    fn auth_selection() {
        let mut cfg = BlobConfig {
            backend: BlobBackend::Gcs,
            bucket: DEFAULT_BUCKET.into(),
            gcs_base_url: DEFAULT_GCS_BASE_URL.into(),
            access_token: None,
            anonymous: false,
            blob_dir: PathBuf::from("./blobs"),
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.into(),
        };
        assert!(matches!(cfg.gcs_auth(), GcsAuth::Metadata));
        cfg.access_token = Some("tok".into());
        assert!(matches!(cfg.gcs_auth(), GcsAuth::Static(ref t) if t == "tok"));
        cfg.anonymous = true;
        assert!(matches!(cfg.gcs_auth(), GcsAuth::Anonymous));
    }

    #[test]
    fn roster_file_wins_over_inline() {
        let path = std::env::temp_dir().join(format!("roster-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"Faker#KR1": "p-faker", "Keria#KR1": null}"#).unwrap();
        let roster = roster_from_sources(path.to_str(), Some("Other#EUW=x")).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.puuid_for("Faker#KR1"), Some("p-faker"));
        assert_eq!(roster.puuid_for("Keria#KR1"), None);
    }

    #[test]
    fn inline_roster_and_missing_sources() {
        let roster = roster_from_sources(None, Some("Faker#KR1=p1;Gumayusi#KR1=p2")).unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster_from_sources(None, None).unwrap().is_empty());
        assert!(roster_from_sources(Some("/nonexistent/roster.json"), None).is_err());
    }
}
