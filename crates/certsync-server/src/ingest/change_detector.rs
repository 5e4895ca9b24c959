//! Change detection for snapshot sources
//!
//! A member's fingerprint depends only on their level and the UTC day of their
//! expiry, so sub-day jitter in a republished dump never counts as a change.
//! Names are not part of the fingerprint.

use certsync_common::types::CertificationRecord;
use sha2::{Digest, Sha256};

use super::models::FingerprintIndex;

const MS_PER_DAY: i64 = 86_400_000;

/// Hex characters kept from the digest
const FINGERPRINT_LEN: usize = 16;

/// Deterministic fingerprint of `(level, expiry day)`
pub fn fingerprint(level: i16, expires_at: i64) -> String {
    let day = expires_at.div_euclid(MS_PER_DAY);
    let digest = Sha256::digest(format!("{}|{}", level, day).as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

pub fn record_fingerprint(record: &CertificationRecord) -> String {
    fingerprint(record.level, record.expires_at)
}

/// Records whose fingerprint differs from the index, in input order
///
/// Members absent from the index are always changed.
pub fn filter_changed(
    records: Vec<CertificationRecord>,
    index: &FingerprintIndex,
) -> Vec<CertificationRecord> {
    records
        .into_iter()
        .filter(|r| index.get(r.member_id) != Some(record_fingerprint(r).as_str()))
        .collect()
}
