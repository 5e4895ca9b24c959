use std::sync::Arc;

use certsync_common::types::Organization;
use mediator::Request;
use serde::{Deserialize, Serialize};

use super::CertificationItem;
use crate::ingest::{CertificationRegistry, SyncError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCertificationQuery {
    pub organization: String,
    pub member_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GetCertificationError {
    #[error("Unknown organization '{0}'")]
    UnknownOrganization(String),
    #[error("Member id must be positive")]
    InvalidMemberId,
    #[error("No {0} certification for member {1}")]
    NotFound(Organization, i64),
    #[error("Registry error: {0}")]
    Registry(#[from] SyncError),
}

impl Request<Result<CertificationItem, GetCertificationError>> for GetCertificationQuery {}

impl GetCertificationQuery {
    pub fn validate(&self) -> Result<Organization, GetCertificationError> {
        if self.member_id <= 0 {
            return Err(GetCertificationError::InvalidMemberId);
        }
        self.organization
            .parse()
            .map_err(|_| GetCertificationError::UnknownOrganization(self.organization.clone()))
    }
}

#[tracing::instrument(skip(registry))]
pub async fn handle(
    registry: Arc<dyn CertificationRegistry>,
    query: GetCertificationQuery,
) -> Result<CertificationItem, GetCertificationError> {
    let organization = query.validate()?;

    registry
        .get(organization, query.member_id)
        .await?
        .map(CertificationItem::from)
        .ok_or(GetCertificationError::NotFound(organization, query.member_id))
}
