use mediator::Request;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::super::SyncFeatureState;
use crate::error::AppError;
use crate::ingest::SyncRunResult;

/// Snapshot text pushed by an operator instead of downloaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSnapshotCommand {
    /// Value of the `X-Sync-Secret` header
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub body: String,
}

impl Request<Result<SyncRunResult, AppError>> for IngestSnapshotCommand {}

impl IngestSnapshotCommand {
    /// Refuse unless a secret is configured and the caller presented it
    pub fn authorize(&self, expected: Option<&str>) -> Result<(), AppError> {
        let expected = expected
            .ok_or_else(|| AppError::Unauthorized("manual ingestion is disabled".to_string()))?;
        let provided = self
            .secret
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("missing sync secret".to_string()))?;

        if secrets_match(expected, provided) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("invalid sync secret".to_string()))
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.body.trim().is_empty() {
            return Err(AppError::Validation("snapshot body is empty".to_string()));
        }
        Ok(())
    }
}

// Fixed-length digests keep the comparison independent of where the inputs differ
fn secrets_match(expected: &str, provided: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[tracing::instrument(skip(state, command), fields(bytes = command.body.len()))]
pub async fn handle(
    state: SyncFeatureState,
    command: IngestSnapshotCommand,
) -> Result<SyncRunResult, AppError> {
    command.authorize(state.shared_secret.as_deref())?;
    command.validate()?;

    let snapshot = state.parser.parse(&command.body)?;
    let result = state.orchestrator.ingest_snapshot(snapshot).await?;

    tracing::info!(
        considered = result.considered,
        written = result.written,
        "Manual TRA snapshot ingested"
    );
    Ok(result)
}
