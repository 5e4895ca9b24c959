pub mod get;
pub mod search;

use certsync_common::types::{CertificationRecord, Organization};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

pub use get::{GetCertificationError, GetCertificationQuery};
pub use search::{
    SearchCertificationsError, SearchCertificationsQuery, SearchCertificationsResponse,
};

/// Certification as returned by the read endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationItem {
    pub organization: Organization,
    pub member_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub level: i16,
    /// Epoch milliseconds, 0 when unknown
    pub expires_at: i64,
    /// UTC calendar day of `expires_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<NaiveDate>,
}

impl From<CertificationRecord> for CertificationItem {
    fn from(record: CertificationRecord) -> Self {
        let expires_on = (record.expires_at != 0)
            .then(|| DateTime::from_timestamp_millis(record.expires_at))
            .flatten()
            .map(|ts| ts.date_naive());

        Self {
            organization: record.organization,
            member_id: record.member_id,
            first_name: record.first_name,
            last_name: record.last_name,
            level: record.level,
            expires_at: record.expires_at,
            expires_on,
        }
    }
}
