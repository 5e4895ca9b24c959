//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::SyncError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Certification error: {0}")]
    CertSync(#[from] certsync_common::CertSyncError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
            AppError::CertSync(ref e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Sync(ref e) => match e {
                SyncError::Parse(message) => (StatusCode::BAD_REQUEST, message.clone()),
                SyncError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.clone()),
                _ => {
                    tracing::error!("Sync error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Synchronization failed".to_string())
                },
            },
            AppError::Unauthorized(ref message) => (StatusCode::UNAUTHORIZED, message.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
