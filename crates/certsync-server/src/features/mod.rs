//! Feature slices of the HTTP API
//!
//! Each feature keeps its `queries/` (reads), `commands/` (writes) and
//! `routes.rs` together. Queries and commands carry a `mediator::Request`
//! marker naming their result type.
//!
//! - **certifications**: point lookup and name search over the registry
//! - **sync**: manual TRA snapshot ingestion and sync state metadata

pub mod certifications;
pub mod sync;

use std::sync::Arc;

use axum::Router;

use crate::ingest::tra::SnapshotParser;
use crate::ingest::{CertificationRegistry, SyncOrchestrator};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub registry: Arc<dyn CertificationRegistry>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub parser: SnapshotParser,
    pub shared_secret: Option<String>,
}

/// Mount every feature under its path prefix
///
/// - `/certifications` - Registry reads
/// - `/sync` - Sync control and metadata
pub fn router(state: FeatureState) -> Router<()> {
    let sync_state = sync::SyncFeatureState {
        orchestrator: state.orchestrator,
        registry: Arc::clone(&state.registry),
        parser: state.parser,
        shared_secret: state.shared_secret,
    };

    Router::new()
        .nest(
            "/certifications",
            certifications::certifications_routes().with_state(state.registry),
        )
        .nest("/sync", sync::sync_routes().with_state(sync_state))
}
