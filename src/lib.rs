//! Two-stage match statistics pipeline.
//!
//! The extract stage polls the Riot match API for a fixed roster and writes a
//! raw JSON snapshot to blob storage. The load stage picks the latest snapshot,
//! flattens it into per-player rows and merges them into the warehouse.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod logging;
pub mod models;
pub mod riot;
pub mod storage;
pub mod warehouse;

pub mod util {
    pub mod env;
}

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{EtlError, EtlResult};
pub use extract::{run_extract, ExtractReport};
pub use load::{run_load, LoadReport};
