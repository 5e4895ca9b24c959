use std::sync::Arc;

use certsync_common::types::Organization;
use mediator::Request;
use serde::{Deserialize, Serialize};

use super::CertificationItem;
use crate::ingest::registry::{SearchFilter, MAX_SEARCH_LIMIT};
use crate::ingest::{CertificationRegistry, SyncError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCertificationsQuery {
    /// Last name prefix (required)
    pub last: Option<String>,
    /// First name prefix
    pub first: Option<String>,
    pub organization: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCertificationsResponse {
    pub results: Vec<CertificationItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchCertificationsError {
    #[error("Last name prefix is required")]
    LastNameRequired,
    #[error("Unknown organization '{0}'")]
    UnknownOrganization(String),
    #[error("Limit must be at least 1")]
    InvalidLimit,
    #[error("Registry error: {0}")]
    Registry(#[from] SyncError),
}

impl Request<Result<SearchCertificationsResponse, SearchCertificationsError>>
    for SearchCertificationsQuery
{
}

impl SearchCertificationsQuery {
    pub fn validate(&self) -> Result<SearchFilter, SearchCertificationsError> {
        let last = self
            .last
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SearchCertificationsError::LastNameRequired)?;

        let organization = match self.organization.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<Organization>()
                    .map_err(|_| SearchCertificationsError::UnknownOrganization(raw.to_string()))?,
            ),
        };

        let limit = self.limit.unwrap_or(MAX_SEARCH_LIMIT);
        if limit < 1 {
            return Err(SearchCertificationsError::InvalidLimit);
        }

        Ok(SearchFilter {
            last_name_prefix: last.to_string(),
            first_name_prefix: self
                .first
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            organization,
            limit: limit.min(MAX_SEARCH_LIMIT),
        })
    }
}

#[tracing::instrument(skip(registry))]
pub async fn handle(
    registry: Arc<dyn CertificationRegistry>,
    query: SearchCertificationsQuery,
) -> Result<SearchCertificationsResponse, SearchCertificationsError> {
    let filter = query.validate()?;
    let records = registry.search(&filter).await?;

    Ok(SearchCertificationsResponse {
        results: records.into_iter().map(CertificationItem::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(last: Option<&str>) -> SearchCertificationsQuery {
        SearchCertificationsQuery {
            last: last.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_last_name_is_required() {
        assert!(matches!(
            query(None).validate(),
            Err(SearchCertificationsError::LastNameRequired)
        ));
        assert!(matches!(
            query(Some("  ")).validate(),
            Err(SearchCertificationsError::LastNameRequired)
        ));
    }

    #[test]
    fn test_limit_bounds() {
        let mut q = query(Some("smi"));
        assert_eq!(q.validate().unwrap().limit, MAX_SEARCH_LIMIT);

        q.limit = Some(500);
        assert_eq!(q.validate().unwrap().limit, MAX_SEARCH_LIMIT);

        q.limit = Some(0);
        assert!(matches!(q.validate(), Err(SearchCertificationsError::InvalidLimit)));
    }

    #[test]
    fn test_filter_fields() {
        let q = SearchCertificationsQuery {
            last: Some(" Smi ".to_string()),
            first: Some("".to_string()),
            organization: Some("tra".to_string()),
            limit: Some(5),
        };
        let filter = q.validate().unwrap();
        assert_eq!(filter.last_name_prefix, "Smi");
        assert_eq!(filter.first_name_prefix, None);
        assert_eq!(filter.organization, Some(Organization::Tra));
        assert_eq!(filter.limit, 5);
    }
}
