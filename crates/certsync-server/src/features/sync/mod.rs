//! Sync control surface: manual snapshot ingestion and state inspection

pub mod commands;
pub mod queries;
pub mod routes;

use std::sync::Arc;

use crate::ingest::tra::SnapshotParser;
use crate::ingest::{CertificationRegistry, SyncOrchestrator};

pub use commands::IngestSnapshotCommand;
pub use queries::{GetSyncMetadataQuery, SyncMetadata};
pub use routes::sync_routes;

#[derive(Clone)]
pub struct SyncFeatureState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub registry: Arc<dyn CertificationRegistry>,
    /// Parser for pushed snapshots, configured like the TRA downloader
    pub parser: SnapshotParser,
    /// Manual ingestion is refused while this is `None`
    pub shared_secret: Option<String>,
}
