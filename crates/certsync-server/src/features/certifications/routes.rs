//! Certification read routes
//!
//! - `GET /api/v1/certifications/search?last=&first=&organization=&limit=`
//! - `GET /api/v1/certifications/:organization/:member_id`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use super::queries::{
    GetCertificationError, GetCertificationQuery, SearchCertificationsError,
    SearchCertificationsQuery,
};
use crate::api::response::{ApiResponse, ErrorResponse};
use crate::ingest::CertificationRegistry;

pub fn certifications_routes() -> Router<Arc<dyn CertificationRegistry>> {
    Router::new()
        .route("/search", get(search_certifications))
        .route("/:organization/:member_id", get(get_certification))
}

/// Point lookup by organization and member number
///
/// # Response
///
/// - `200 OK` - Certification found
/// - `400 Bad Request` - Unknown organization or non-positive member number
/// - `404 Not Found` - No record for that member
#[tracing::instrument(skip(registry))]
async fn get_certification(
    State(registry): State<Arc<dyn CertificationRegistry>>,
    Path((organization, member_id)): Path<(String, i64)>,
) -> Result<Response, CertificationApiError> {
    let query = GetCertificationQuery {
        organization,
        member_id,
    };

    let item = super::queries::get::handle(registry, query).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(item))).into_response())
}

/// Case-insensitive name prefix search
///
/// # Query Parameters
///
/// - `last` - Last name prefix (required)
/// - `first` - First name prefix
/// - `organization` - `NAR` or `TRA`
/// - `limit` - Maximum results (default and max: 25)
#[tracing::instrument(skip(registry))]
async fn search_certifications(
    State(registry): State<Arc<dyn CertificationRegistry>>,
    Query(query): Query<SearchCertificationsQuery>,
) -> Result<Response, CertificationApiError> {
    let response = super::queries::search::handle(registry, query).await?;

    tracing::debug!(count = response.results.len(), "Certification search");

    let meta = json!({ "count": response.results.len() });
    Ok((StatusCode::OK, Json(ApiResponse::success_with_meta(response.results, meta)))
        .into_response())
}

#[derive(Debug)]
enum CertificationApiError {
    GetError(GetCertificationError),
    SearchError(SearchCertificationsError),
}

impl From<GetCertificationError> for CertificationApiError {
    fn from(err: GetCertificationError) -> Self {
        Self::GetError(err)
    }
}

impl From<SearchCertificationsError> for CertificationApiError {
    fn from(err: SearchCertificationsError) -> Self {
        Self::SearchError(err)
    }
}

impl IntoResponse for CertificationApiError {
    fn into_response(self) -> Response {
        match &self {
            CertificationApiError::GetError(GetCertificationError::UnknownOrganization(_))
            | CertificationApiError::GetError(GetCertificationError::InvalidMemberId)
            | CertificationApiError::SearchError(SearchCertificationsError::LastNameRequired)
            | CertificationApiError::SearchError(SearchCertificationsError::UnknownOrganization(
                _,
            ))
            | CertificationApiError::SearchError(SearchCertificationsError::InvalidLimit) => {
                ErrorResponse::new("VALIDATION_ERROR", self.to_string())
                    .into_response_with(StatusCode::BAD_REQUEST)
            },
            CertificationApiError::GetError(GetCertificationError::NotFound(..)) => {
                ErrorResponse::new("NOT_FOUND", self.to_string())
                    .into_response_with(StatusCode::NOT_FOUND)
            },
            CertificationApiError::GetError(GetCertificationError::Registry(_))
            | CertificationApiError::SearchError(SearchCertificationsError::Registry(_)) => {
                tracing::error!("Registry error while reading certifications: {}", self);
                ErrorResponse::new("INTERNAL_ERROR", "A database error occurred")
                    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
            },
        }
    }
}

impl std::fmt::Display for CertificationApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetError(e) => write!(f, "{}", e),
            Self::SearchError(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::memory::MemoryRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use certsync_common::types::{CertificationRecord, Organization};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app() -> Router {
        let registry = Arc::new(MemoryRegistry::default());
        for record in [
            CertificationRecord::new(Organization::Nar, 10, "Robert", "Goddard", 3, 0),
            CertificationRecord::new(Organization::Tra, 11, "Rita", "Gonzales", 2, 0),
            CertificationRecord::new(Organization::Tra, 12, "Homer", "Hickam", 1, 0),
        ] {
            registry.upsert(&record).await.unwrap();
        }
        certifications_routes().with_state(registry as Arc<dyn CertificationRegistry>)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_get_certification() {
        let (status, body) = get_json(app().await, "/nar/10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["last_name"], "Goddard");
        assert_eq!(body["data"]["organization"], "NAR");

        let (status, body) = get_json(app().await, "/TRA/10").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = get_json(app().await, "/ARA/10").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_certifications() {
        let (status, body) = get_json(app().await, "/search?last=go").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["count"], 2);
        assert_eq!(body["data"][0]["last_name"], "Goddard");

        let (_, body) = get_json(app().await, "/search?last=go&organization=TRA").await;
        assert_eq!(body["meta"]["count"], 1);
        assert_eq!(body["data"][0]["member_id"], 11);

        let (status, body) = get_json(app().await, "/search?first=x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
