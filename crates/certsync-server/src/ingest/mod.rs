//! Certification sync engine
//!
//! Keeps the local certification registry current with two upstream
//! organizations that publish very differently:
//!
//! - **NAR** exposes a paged search API filtered by modification time. The
//!   engine walks it one page per tick, driven by a persisted [`ScanCursor`].
//! - **TRA** publishes a full membership dump. Each snapshot tick diffs the
//!   dump against a persisted [`FingerprintIndex`] and writes only members
//!   whose level or expiry day changed.
//!
//! # Architecture
//!
//! - **config**: `INGEST_*` environment configuration
//! - **models**: persisted per-organization state and per-tick summaries
//! - **state_store**: durable key-value store for that state
//! - **registry**: the certification table and its search queries
//! - **writer**: bounded-concurrency upsert of a record batch
//! - **change_detector**: fingerprints and change filtering for snapshots
//! - **levels** / **dates**: normalization of loosely formatted source fields
//! - **nar** / **tra**: source adapters
//! - **orchestrator**: one tick per organization
//! - **scheduler**: periodic ticks inside the server process
//! - **memory**: in-process store and registry for tests and dry runs

pub mod change_detector;
pub mod config;
pub mod dates;
pub mod levels;
pub mod memory;
pub mod models;
pub mod nar;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod state_store;
pub mod tra;
pub mod writer;

pub use config::{IngestConfig, NarConfig, TraConfig};
pub use models::{FingerprintIndex, Pagination, ScanCursor, SyncRunResult, TickState, Watermark};
pub use orchestrator::SyncOrchestrator;
pub use registry::{CertificationRegistry, PgCertificationRegistry};
pub use scheduler::TickScheduler;
pub use state_store::{PgStateStore, StateStore};
pub use writer::{BatchUpsertWriter, UpsertOutcome};

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error types for certification sync
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tick timed out after {0}s")]
    Timeout(u64),
}

impl From<certsync_common::CertSyncError> for SyncError {
    fn from(err: certsync_common::CertSyncError) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

/// Longest upstream response body kept in an error message, in bytes
const ERROR_BODY_LIMIT: usize = 512;

/// Shorten an upstream error body without splitting a character
pub(crate) fn clip_error_body(mut body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_error_body_respects_char_boundaries() {
        let body = format!("{}é{}", "x".repeat(511), "y".repeat(100));
        let clipped = clip_error_body(body);
        assert_eq!(clipped.len(), 511);
        assert!(clipped.chars().all(|c| c == 'x'));

        assert_eq!(clip_error_body("short".to_string()), "short");
        assert_eq!(clip_error_body("z".repeat(600)).len(), 512);
    }
}
