use certsync_common::types::Organization;
use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};

use super::super::SyncFeatureState;
use crate::ingest::models::{Pagination, ScanCursor, Watermark};
use crate::ingest::{state_store, FingerprintIndex, SyncError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetSyncMetadataQuery;

/// Persisted sync state of both organizations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub nar: NarMetadata,
    pub tra: TraMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarMetadata {
    pub enabled: bool,
    pub query_watermark: Watermark,
    pub tracking_watermark: Watermark,
    pub pagination: Option<Pagination>,
    pub scan_began_at: Option<DateTime<Utc>>,
    pub scan_ended_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub records: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraMetadata {
    pub enabled: bool,
    pub tracked_members: usize,
    pub pending: usize,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub records: i64,
}

impl Request<Result<SyncMetadata, SyncError>> for GetSyncMetadataQuery {}

impl NarMetadata {
    fn new(cursor: ScanCursor, enabled: bool, records: i64) -> Self {
        Self {
            enabled,
            query_watermark: cursor.query_watermark,
            tracking_watermark: cursor.tracking_watermark,
            pagination: cursor.pagination,
            scan_began_at: cursor.scan_began_at,
            scan_ended_at: cursor.scan_ended_at,
            last_tick_at: cursor.last_tick_at,
            records,
        }
    }
}

impl TraMetadata {
    fn new(index: FingerprintIndex, enabled: bool, records: i64) -> Self {
        Self {
            enabled,
            tracked_members: index.len(),
            pending: index.pending,
            updated_at: index.updated_at,
            last_tick_at: index.last_tick_at,
            published_at: index.published_at,
            records,
        }
    }
}

/// Read-only view of the state store and registry counts
#[tracing::instrument(skip(state))]
pub async fn handle(
    state: SyncFeatureState,
    _query: GetSyncMetadataQuery,
) -> Result<SyncMetadata, SyncError> {
    let store = state.orchestrator.store();
    let enabled = state.orchestrator.organizations();

    let cursor = state_store::load_cursor(store.as_ref()).await?;
    let index = state_store::load_index(store.as_ref()).await?;

    Ok(SyncMetadata {
        nar: NarMetadata::new(
            cursor,
            enabled.contains(&Organization::Nar),
            state.registry.count(Organization::Nar).await?,
        ),
        tra: TraMetadata::new(
            index,
            enabled.contains(&Organization::Tra),
            state.registry.count(Organization::Tra).await?,
        ),
    })
}
