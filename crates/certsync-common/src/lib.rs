//! certsync common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging for the certsync workspace.
//!
//! # Overview
//!
//! - **Types**: the canonical certification record and the organizations that issue it
//! - **Error Handling**: a small error type for parsing the shared types
//! - **Logging**: `tracing` subscriber bootstrap used by every binary
//!
//! # Example
//!
//! ```no_run
//! use certsync_common::types::{CertificationRecord, Organization};
//!
//! let record = CertificationRecord::new(Organization::Tra, 12345, "Ada", "Lovelace", 2, 0);
//! assert_eq!(record.key(), (Organization::Tra, 12345));
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CertSyncError, Result};
