//! TRA adapter (snapshot-diff source)
//!
//! TRA offers no server-side filtering, so every tick downloads the whole
//! membership dump and leaves the diffing to the change detector.

pub mod client;
pub mod parser;

use async_trait::async_trait;
use certsync_common::types::CertificationRecord;
use chrono::{DateTime, Utc};

use super::Result;

pub use client::TraClient;
pub use parser::SnapshotParser;

/// One parsed dump, de-duplicated by member number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub records: Vec<CertificationRecord>,
    /// Publication time from the dump's metadata line, if present
    pub published_at: Option<DateTime<Utc>>,
    /// Rows discarded as malformed
    pub dropped: usize,
    /// Rows ignored as repeats of an earlier member number
    pub duplicates: usize,
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot>;
}
