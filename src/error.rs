//! Pipeline error taxonomy.

use thiserror::Error;

pub type EtlResult<T> = Result<T, EtlError>;

/// Errors surfaced by either pipeline stage. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Missing or malformed configuration (roster, env vars, identifiers)
    #[error("configuration error: {0}")]
    Config(String),

    /// The statistics API answered with something other than 200
    #[error("upstream error: {endpoint} returned HTTP {status}: {body}")]
    Upstream {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Transport-level failure talking to the statistics API
    #[error("upstream request failed: {0}")]
    UpstreamTransport(String),

    /// Blob store failures, including "no snapshot found"
    #[error("storage error: {0}")]
    Storage(String),

    /// Snapshot content could not be decoded
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Warehouse failures (DDL, insert, merge)
    #[error("warehouse error: {0}")]
    Warehouse(String),
}

impl EtlError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn warehouse(msg: impl Into<String>) -> Self {
        Self::Warehouse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Upstream { .. } | Self::UpstreamTransport(_) => "upstream",
            Self::Storage(_) => "storage",
            Self::Snapshot(_) => "snapshot",
            Self::Warehouse(_) => "warehouse",
        }
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(e: sqlx::Error) -> Self {
        Self::Warehouse(e.to_string())
    }
}
