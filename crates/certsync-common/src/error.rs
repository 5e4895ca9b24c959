//! Error types shared across certsync crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, CertSyncError>;

/// Errors raised while building or parsing the shared domain types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CertSyncError {
    #[error("Unknown organization: {0}")]
    UnknownOrganization(String),

    #[error("Invalid member id: {0}")]
    InvalidMemberId(String),

    #[error("Certification level out of range: {0}")]
    InvalidLevel(i64),
}
