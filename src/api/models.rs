// Response bodies

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchStatsResponse {
    pub message: String,
    pub gcs_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadResponse {
    pub message: String,
    pub rows_processed: usize,
    pub skipped: usize,
    pub duplicates: usize,
    #[serde(default)]
    pub already_loaded: usize,
}

impl From<&crate::load::LoadReport> for LoadResponse {
    fn from(r: &crate::load::LoadReport) -> Self {
        Self {
            message: r.message(),
            rows_processed: r.rows_processed,
            skipped: r.skipped,
            duplicates: r.duplicates,
            already_loaded: r.already_loaded,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}
