//! Shared domain types
//!
//! The canonical certification record every source adapter normalizes into,
//! and the organizations that issue those records.

use serde::{Deserialize, Serialize};

use crate::error::CertSyncError;

/// Highest certification level either organization issues.
pub const MAX_CERT_LEVEL: i16 = 3;

/// Level recorded for uncertified members and unrecognized codes.
pub const UNCERTIFIED_LEVEL: i16 = 0;

/// Organization issuing high-power certifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Organization {
    /// National Association of Rocketry (cursor-paged membership API)
    #[serde(rename = "NAR")]
    Nar,
    /// Tripoli Rocketry Association (full snapshot dump)
    #[serde(rename = "TRA")]
    Tra,
}

impl Organization {
    /// Every organization, in tick order
    pub const ALL: [Organization; 2] = [Organization::Nar, Organization::Tra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Organization::Nar => "NAR",
            Organization::Tra => "TRA",
        }
    }
}

impl std::fmt::Display for Organization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Organization {
    type Err = CertSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NAR" => Ok(Organization::Nar),
            "TRA" => Ok(Organization::Tra),
            _ => Err(CertSyncError::UnknownOrganization(s.to_string())),
        }
    }
}

/// Canonical certification record
///
/// Keyed by `(organization, member_id)`. Names are best-effort strings as the
/// source reports them; `expires_at` is epoch milliseconds, or 0 when the
/// source value could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRecord {
    pub organization: Organization,
    pub member_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub level: i16,
    pub expires_at: i64,
}

impl CertificationRecord {
    pub fn new(
        organization: Organization,
        member_id: i64,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        level: i16,
        expires_at: i64,
    ) -> Self {
        Self {
            organization,
            member_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            level: level.clamp(UNCERTIFIED_LEVEL, MAX_CERT_LEVEL),
            expires_at,
        }
    }

    /// Primary key of the record in the registry
    pub fn key(&self) -> (Organization, i64) {
        (self.organization, self.member_id)
    }

    /// Check the invariants a record must hold before it is persisted
    pub fn validate(&self) -> Result<(), CertSyncError> {
        if self.member_id <= 0 {
            return Err(CertSyncError::InvalidMemberId(self.member_id.to_string()));
        }
        if !(UNCERTIFIED_LEVEL..=MAX_CERT_LEVEL).contains(&self.level) {
            return Err(CertSyncError::InvalidLevel(i64::from(self.level)));
        }
        Ok(())
    }
}

/// Parse a source-assigned member number ("  01234 " -> 1234)
pub fn parse_member_id(raw: &str) -> Result<i64, CertSyncError> {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CertSyncError::InvalidMemberId(trimmed.to_string())),
    }
}
