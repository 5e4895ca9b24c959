//! NAR adapter (cursor-paged source)
//!
//! NAR's membership search is filtered by modification time and sorted
//! ascending. The adapter fetches exactly one page per call; advancing the
//! [`ScanCursor`](crate::ingest::models::ScanCursor) is the orchestrator's job
//! once the page's writes have settled.

pub mod client;
pub mod models;

use async_trait::async_trait;

use super::models::{Pagination, ScanCursor};
use super::Result;

pub use client::NarClient;
pub use models::ScanRecord;

/// One page of a scan pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub records: Vec<ScanRecord>,
    /// Pagination reported by the source for this page
    pub pagination: Pagination,
    pub total_results: u64,
    /// Results discarded for missing mandatory fields
    pub dropped: usize,
}

#[async_trait]
pub trait CursorPagedSource: Send + Sync {
    /// Fetch the page after the cursor's current position
    async fn fetch_next_page(&self, cursor: &ScanCursor) -> Result<ScanPage>;
}
