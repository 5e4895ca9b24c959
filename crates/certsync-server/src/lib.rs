//! certsync server library
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
//!
//! Keeps a local registry of NAR and TRA high-power rocketry certifications
//! current by pulling from both organizations in the background.
//!
//! # Overview
//!
//! - **Ingestion**: tick-driven sync engine ([`ingest`]). NAR is walked page by
//!   page behind a modification-time watermark; TRA is downloaded whole and
//!   diffed against per-member fingerprints.
//! - **API Endpoints**: certification lookup and search, manual snapshot
//!   ingestion and sync metadata ([`features`])
//! - **Configuration**: environment-based configuration ([`config`])
//! - **Middleware**: CORS and request tracing ([`middleware`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use certsync_server::ingest::{IngestConfig, SyncOrchestrator};
//!
//! # async fn run(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let config = IngestConfig::from_env()?;
//! let orchestrator = Arc::new(SyncOrchestrator::from_config(&config, pool)?);
//! for result in orchestrator.tick().await {
//!     println!("{}: wrote {}", result.organization, result.written);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

pub use error::AppError;
