//! TRA membership dump parser
//!
//! # Format
//! Delimited text, one member per row:
//!
//! ```text
//! # Published: 2026-10-01 06:00:00
//! Member #,Last Name,First Name,Cert Level,Expiration
//! 14021,Goddard,Robert,2,2027-03-31
//! 14022,"Parsons, Jr.",John,Mentor,3/31/27
//! ```
//!
//! The metadata line and the header row are both optional. A metadata line is
//! only recognized before the header and the first member row.

use std::collections::HashSet;

use certsync_common::types::{parse_member_id, CertificationRecord, Organization};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

use super::Snapshot;
use crate::ingest::dates::{parse_expiry, parse_timestamp};
use crate::ingest::levels::LevelRemap;
use crate::ingest::Result;

/// Labels that introduce the publication timestamp, longest first
const METADATA_LABELS: &[&str] = &["last updated", "published", "updated", "as of"];

const COL_MEMBER: usize = 0;
const COL_LAST_NAME: usize = 1;
const COL_FIRST_NAME: usize = 2;
const COL_LEVEL: usize = 3;
const COL_EXPIRATION: usize = 4;

#[derive(Debug, Clone)]
pub struct SnapshotParser {
    delimiter: u8,
    levels: LevelRemap,
}

impl Default for SnapshotParser {
    fn default() -> Self {
        Self::new(b',', LevelRemap::default())
    }
}

impl SnapshotParser {
    pub fn new(delimiter: u8, levels: LevelRemap) -> Self {
        Self { delimiter, levels }
    }

    /// Parse a full dump
    ///
    /// Rows without a usable member number are dropped; later duplicates of a
    /// member number are ignored.
    pub fn parse(&self, content: &str) -> Result<Snapshot> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .from_reader(content.as_bytes());

        let mut snapshot = Snapshot::default();
        let mut seen = HashSet::new();
        let mut in_preamble = true;

        for (index, row) in reader.records().enumerate() {
            let line = index + 1;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(line, error = %e, "Dropping unreadable TRA row");
                    snapshot.dropped += 1;
                    continue;
                },
            };

            let first = cell(&row, COL_MEMBER);
            if row.iter().all(str::is_empty) {
                continue;
            }

            if in_preamble {
                if let Some(published) = metadata_timestamp(&row) {
                    if snapshot.published_at.is_none() {
                        snapshot.published_at = published;
                    }
                    continue;
                }
                in_preamble = false;
            }

            if is_header(first) {
                debug!(line, "Skipping TRA header row");
                continue;
            }

            let member_id = match parse_member_id(first) {
                Ok(id) => id,
                Err(_) => {
                    warn!(line, member = first, "Dropping TRA row with invalid member number");
                    snapshot.dropped += 1;
                    continue;
                },
            };

            if !seen.insert(member_id) {
                debug!(line, member_id, "Ignoring duplicate TRA member");
                snapshot.duplicates += 1;
                continue;
            }

            snapshot.records.push(CertificationRecord::new(
                Organization::Tra,
                member_id,
                cell(&row, COL_FIRST_NAME),
                cell(&row, COL_LAST_NAME),
                self.levels.parse(cell(&row, COL_LEVEL)),
                parse_expiry(cell(&row, COL_EXPIRATION)),
            ));
        }

        debug!(
            records = snapshot.records.len(),
            dropped = snapshot.dropped,
            duplicates = snapshot.duplicates,
            "Parsed TRA snapshot"
        );
        Ok(snapshot)
    }
}

fn cell(row: &StringRecord, index: usize) -> &str {
    row.get(index).unwrap_or("")
}

fn is_header(first: &str) -> bool {
    first.parse::<i64>().is_err() && first.to_lowercase().contains("member")
}

/// `Some(timestamp)` when the row is a metadata line
///
/// The inner value is `None` when the label is present but its timestamp is
/// unreadable; the row is still not a record.
fn metadata_timestamp(row: &StringRecord) -> Option<Option<DateTime<Utc>>> {
    let first = cell(row, 0).trim_start_matches('#').trim_start();
    let lowered = first.to_lowercase();
    let label = METADATA_LABELS.iter().find(|l| lowered.starts_with(*l))?;

    let rest = first
        .get(label.len()..)
        .unwrap_or("")
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    let raw = if rest.is_empty() { cell(row, 1) } else { rest };
    Some(parse_timestamp(raw))
}
