//! Data models for certification sync
//!
//! Persisted per-organization state (the NAR scan cursor and the TRA
//! fingerprint index) and the per-tick run summary.

use std::collections::BTreeMap;

use certsync_common::types::Organization;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic `(account id, modification time)` bookmark
///
/// `modified_at` is epoch milliseconds. Both components are tracked as
/// independent running maxima.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub account_id: i64,
    pub modified_at: i64,
}

impl Watermark {
    pub fn new(account_id: i64, modified_at: i64) -> Self {
        Self {
            account_id,
            modified_at,
        }
    }

    /// Componentwise maximum of two watermarks
    pub fn max(self, other: Watermark) -> Watermark {
        Watermark {
            account_id: self.account_id.max(other.account_id),
            modified_at: self.modified_at.max(other.modified_at),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.account_id == 0 && self.modified_at == 0
    }
}

/// Position of the most recently fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(current_page: u32, total_pages: u32) -> Self {
        Self {
            current_page,
            total_pages,
        }
    }

    /// True once the page just fetched is the final one of the pass
    pub fn is_last_page(&self) -> bool {
        self.total_pages == 0 || self.current_page + 1 >= self.total_pages
    }
}

/// Scan state of the cursor-paged source
///
/// `query_watermark` only moves when a pass completes; until then every page
/// of the pass is requested against the same lower bound, so an interrupted
/// pass resumes exactly where it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanCursor {
    pub query_watermark: Watermark,
    pub tracking_watermark: Watermark,
    /// `None` between passes
    pub pagination: Option<Pagination>,
    pub scan_began_at: Option<DateTime<Utc>>,
    pub scan_ended_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl ScanCursor {
    /// Page the next tick should request
    pub fn next_page(&self) -> u32 {
        self.pagination.map_or(0, |p| p.current_page + 1)
    }

    pub fn is_scanning(&self) -> bool {
        self.pagination.is_some()
    }

    /// A completed pass inside its cooldown window
    pub fn is_idle(&self, now: DateTime<Utc>, idle_interval: Duration) -> bool {
        !self.is_scanning()
            && self
                .scan_ended_at
                .is_some_and(|ended| now.signed_duration_since(ended) < idle_interval)
    }

    /// Advance past a fully written page
    ///
    /// Returns true when the page completed the pass.
    pub fn apply_page(
        &mut self,
        pagination: Pagination,
        observed: Watermark,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_scanning() {
            self.scan_began_at = Some(now);
        }
        self.tracking_watermark = self.tracking_watermark.max(observed);
        self.last_tick_at = Some(now);

        if pagination.is_last_page() {
            self.query_watermark = self.query_watermark.max(self.tracking_watermark);
            self.tracking_watermark = Watermark::default();
            self.pagination = None;
            self.scan_ended_at = Some(now);
            true
        } else {
            self.pagination = Some(pagination);
            false
        }
    }

    /// Keep the current page for a retry after some of its writes failed
    pub fn hold_page(&mut self, written: Watermark, now: DateTime<Utc>) {
        self.tracking_watermark = self.tracking_watermark.max(written);
        self.last_tick_at = Some(now);
    }
}

/// Last-written fingerprint per member of the snapshot source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintIndex {
    pub entries: BTreeMap<i64, String>,
    /// Last time at least one fingerprint was recorded
    pub updated_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Publication time reported by the most recent snapshot
    pub published_at: Option<DateTime<Utc>>,
    /// Changed members the last tick left unwritten
    pub pending: usize,
}

impl FingerprintIndex {
    pub fn get(&self, member_id: i64) -> Option<&str> {
        self.entries.get(&member_id).map(String::as_str)
    }

    pub fn record(&mut self, member_id: i64, fingerprint: String, now: DateTime<Utc>) {
        self.entries.insert(member_id, fingerprint);
        self.updated_at = Some(now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a snapshot tick should run now
    pub fn is_due(&self, now: DateTime<Utc>, refresh_interval: Duration) -> bool {
        if self.pending > 0 {
            return true;
        }
        match self.last_tick_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= refresh_interval,
        }
    }
}

/// What a tick did for an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickState {
    IdleWait,
    ScanningPass,
    SnapshotTick,
}

impl std::fmt::Display for TickState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickState::IdleWait => write!(f, "IDLE_WAIT"),
            TickState::ScanningPass => write!(f, "SCANNING_PASS"),
            TickState::SnapshotTick => write!(f, "SNAPSHOT_TICK"),
        }
    }
}

/// Summary of one tick, for logs and API responses only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub organization: Organization,
    pub state: TickState,
    /// Records delivered by the source this tick
    pub considered: usize,
    /// Records selected for writing
    pub changed: usize,
    pub written: usize,
    /// Member ids whose write failed
    pub failed: Vec<i64>,
    /// Malformed source records discarded
    pub dropped: usize,
    pub pass_completed: bool,
    pub elapsed_ms: u64,
}

impl SyncRunResult {
    pub fn new(organization: Organization, state: TickState) -> Self {
        Self {
            organization,
            state,
            considered: 0,
            changed: 0,
            written: 0,
            failed: Vec::new(),
            dropped: 0,
            pass_completed: false,
            elapsed_ms: 0,
        }
    }

    pub fn idle(organization: Organization) -> Self {
        Self::new(organization, TickState::IdleWait)
    }

    pub fn finish(mut self, started: std::time::Instant) -> Self {
        self.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            organization = %self.organization,
            state = %self.state,
            considered = self.considered,
            changed = self.changed,
            written = self.written,
            failed = self.failed.len(),
            dropped = self.dropped,
            pass_completed = self.pass_completed,
            elapsed_ms = self.elapsed_ms,
            "Sync tick finished"
        );
        self
    }
}
