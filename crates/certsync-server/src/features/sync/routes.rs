//! Sync routes
//!
//! - `POST /api/v1/sync/tra/snapshot` - Diff and write a pushed TRA snapshot
//! - `GET /api/v1/sync/metadata` - Cursor and fingerprint index state

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::commands::IngestSnapshotCommand;
use super::queries::GetSyncMetadataQuery;
use super::SyncFeatureState;
use crate::api::response::ApiResponse;
use crate::error::AppError;
use crate::middleware::SYNC_SECRET_HEADER;

pub fn sync_routes() -> Router<SyncFeatureState> {
    Router::new()
        .route("/tra/snapshot", post(ingest_tra_snapshot))
        .route("/metadata", get(get_sync_metadata))
}

/// Run one snapshot-diff-write cycle on the request body
///
/// # Response
///
/// - `200 OK` - The run summary
/// - `400 Bad Request` - Empty or unreadable snapshot
/// - `401 Unauthorized` - Missing or wrong `X-Sync-Secret`, or no secret configured
#[tracing::instrument(skip(state, headers, body))]
async fn ingest_tra_snapshot(
    State(state): State<SyncFeatureState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let secret = headers
        .get(SYNC_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let command = IngestSnapshotCommand { secret, body };
    let result = super::commands::ingest_snapshot::handle(state, command).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(result))).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_sync_metadata(State(state): State<SyncFeatureState>) -> Result<Response, AppError> {
    let metadata = super::queries::get_metadata::handle(state, GetSyncMetadataQuery).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(metadata))).into_response())
}
