//! NAR membership search wire format
//!
//! Field labels are NAR's own; nothing outside this module should know them.

use certsync_common::types::{parse_member_id, CertificationRecord, Organization};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::dates::{parse_expiry, parse_timestamp};
use crate::ingest::levels::LevelRemap;
use crate::ingest::models::{Pagination, Watermark};

pub const FIELD_ACCOUNT_ID: &str = "Account ID";
pub const FIELD_MEMBER_NUMBER: &str = "Member Number";
pub const FIELD_FIRST_NAME: &str = "First Name";
pub const FIELD_LAST_NAME: &str = "Last Name";
pub const FIELD_LEVEL: &str = "HPR Level";
pub const FIELD_EXPIRATION: &str = "Expiration Date";
pub const FIELD_LAST_MODIFIED: &str = "Last Modified";

/// Output projection requested on every search
pub const SEARCH_FIELDS: [&str; 7] = [
    FIELD_ACCOUNT_ID,
    FIELD_MEMBER_NUMBER,
    FIELD_FIRST_NAME,
    FIELD_LAST_NAME,
    FIELD_LEVEL,
    FIELD_EXPIRATION,
    FIELD_LAST_MODIFIED,
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub filter: String,
    pub fields: Vec<String>,
    pub pagination: RequestPagination,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPagination {
    pub current_page: u32,
    pub page_size: u32,
    pub sort_column: String,
    pub sort_direction: String,
}

impl SearchRequest {
    /// Members modified at or after `since_ms`, oldest first
    pub fn modified_since(since_ms: i64, page: u32, page_size: u32) -> Self {
        let since = DateTime::<Utc>::from_timestamp_millis(since_ms)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        Self {
            filter: format!("LastModified >= '{}'", since),
            fields: SEARCH_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            pagination: RequestPagination {
                current_page: page,
                page_size,
                sort_column: "LastModified".to_string(),
                sort_direction: "ASC".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub pagination: ResponsePagination,
    #[serde(default)]
    pub search_results: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePagination {
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u64,
}

impl From<ResponsePagination> for Pagination {
    fn from(p: ResponsePagination) -> Self {
        Pagination::new(p.current_page, p.total_pages)
    }
}

/// One member from a page together with its position in modification order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub record: CertificationRecord,
    pub watermark: Watermark,
}

/// Why a search result could not become a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingField(&'static str),
    InvalidMemberNumber(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "missing {}", field),
            RejectReason::InvalidMemberNumber(raw) => write!(f, "invalid member number {:?}", raw),
        }
    }
}

/// Render a JSON scalar as text; NAR mixes strings and numbers freely
fn text(fields: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize one search result
///
/// Member number and both names are mandatory. A missing account id or
/// modification time counts as zero for watermark purposes.
pub fn to_scan_record(
    fields: &serde_json::Map<String, Value>,
    levels: &LevelRemap,
) -> Result<ScanRecord, RejectReason> {
    let raw_member = text(fields, FIELD_MEMBER_NUMBER)
        .ok_or(RejectReason::MissingField(FIELD_MEMBER_NUMBER))?;
    let member_id = parse_member_id(&raw_member)
        .map_err(|_| RejectReason::InvalidMemberNumber(raw_member.clone()))?;
    let first_name =
        text(fields, FIELD_FIRST_NAME).ok_or(RejectReason::MissingField(FIELD_FIRST_NAME))?;
    let last_name =
        text(fields, FIELD_LAST_NAME).ok_or(RejectReason::MissingField(FIELD_LAST_NAME))?;

    let level = text(fields, FIELD_LEVEL).map_or(0, |raw| levels.parse(&raw));
    let expires_at = text(fields, FIELD_EXPIRATION).map_or(0, |raw| parse_expiry(&raw));

    let account_id = text(fields, FIELD_ACCOUNT_ID)
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0);
    let modified_at = text(fields, FIELD_LAST_MODIFIED)
        .and_then(|raw| parse_timestamp(&raw))
        .map_or(0, |ts| ts.timestamp_millis());

    Ok(ScanRecord {
        record: CertificationRecord::new(
            Organization::Nar,
            member_id,
            first_name,
            last_name,
            level,
            expires_at,
        ),
        watermark: Watermark::new(account_id, modified_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_request_shape() {
        let request = SearchRequest::modified_since(0, 3, 200);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["filter"], "LastModified >= '1970-01-01T00:00:00Z'");
        assert_eq!(body["pagination"]["currentPage"], 3);
        assert_eq!(body["pagination"]["pageSize"], 200);
        assert_eq!(body["pagination"]["sortColumn"], "LastModified");
        assert_eq!(body["pagination"]["sortDirection"], "ASC");
        assert_eq!(body["fields"].as_array().unwrap().len(), SEARCH_FIELDS.len());
    }

    #[test]
    fn test_to_scan_record() {
        let result = fields(json!({
            "Account ID": 5512,
            "Member Number": "091234",
            "First Name": "Homer",
            "Last Name": "Hickam",
            "HPR Level": "Level 2",
            "Expiration Date": "2027-06-30",
            "Last Modified": "2026-09-01T10:00:00Z"
        }));

        let scanned = to_scan_record(&result, &LevelRemap::default()).unwrap();
        assert_eq!(scanned.record.member_id, 91234);
        assert_eq!(scanned.record.level, 2);
        assert_eq!(scanned.record.organization, Organization::Nar);
        assert_eq!(scanned.watermark.account_id, 5512);
        assert_eq!(scanned.watermark.modified_at, 1_788_256_800_000);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let result = fields(json!({
            "Member Number": 12,
            "First Name": "  ",
            "Last Name": "Goddard"
        }));
        assert_eq!(
            to_scan_record(&result, &LevelRemap::default()),
            Err(RejectReason::MissingField(FIELD_FIRST_NAME))
        );
    }

    #[test]
    fn test_optional_fields_default_to_zero() {
        let result = fields(json!({
            "Member Number": 12,
            "First Name": "Robert",
            "Last Name": "Goddard"
        }));
        let scanned = to_scan_record(&result, &LevelRemap::default()).unwrap();
        assert_eq!(scanned.record.level, 0);
        assert_eq!(scanned.record.expires_at, 0);
        assert!(scanned.watermark.is_zero());
    }
}
