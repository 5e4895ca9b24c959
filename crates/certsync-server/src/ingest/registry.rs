//! Relational certification registry
//!
//! The `certifications` table holds at most one row per
//! `(organization, member_id)`. Upserts overwrite every column, so replaying
//! a write is harmless.

use async_trait::async_trait;
use certsync_common::types::{CertificationRecord, Organization};
use sqlx::{postgres::PgRow, PgPool, Row};

use super::Result;

/// Maximum rows a name search may return
pub const MAX_SEARCH_LIMIT: i64 = 25;

/// Name search over the registry
///
/// Both name filters are case-insensitive prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub last_name_prefix: String,
    pub first_name_prefix: Option<String>,
    pub organization: Option<Organization>,
    pub limit: i64,
}

impl SearchFilter {
    pub fn new(last_name_prefix: impl Into<String>) -> Self {
        Self {
            last_name_prefix: last_name_prefix.into(),
            first_name_prefix: None,
            organization: None,
            limit: MAX_SEARCH_LIMIT,
        }
    }

    /// Whether a record satisfies this filter
    pub fn matches(&self, record: &CertificationRecord) -> bool {
        let starts_with = |value: &str, prefix: &str| {
            value.to_lowercase().starts_with(&prefix.to_lowercase())
        };

        starts_with(&record.last_name, &self.last_name_prefix)
            && self
                .first_name_prefix
                .as_deref()
                .map_or(true, |p| starts_with(&record.first_name, p))
            && self.organization.map_or(true, |o| o == record.organization)
    }
}

#[async_trait]
pub trait CertificationRegistry: Send + Sync {
    /// Insert or fully overwrite the row keyed by the record
    async fn upsert(&self, record: &CertificationRecord) -> Result<()>;

    async fn get(
        &self,
        organization: Organization,
        member_id: i64,
    ) -> Result<Option<CertificationRecord>>;

    /// Records ordered by last name, first name, organization, member id
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CertificationRecord>>;

    async fn count(&self, organization: Organization) -> Result<i64>;
}

#[derive(Clone)]
pub struct PgCertificationRegistry {
    pool: PgPool,
}

impl PgCertificationRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> Result<CertificationRecord> {
        let organization: String = row.try_get("organization")?;
        let organization = organization.parse::<Organization>()?;

        Ok(CertificationRecord {
            organization,
            member_id: row.try_get("member_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            level: row.try_get("level")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

/// Escape LIKE wildcards so user input only ever matches literally
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl CertificationRegistry for PgCertificationRegistry {
    async fn upsert(&self, record: &CertificationRecord) -> Result<()> {
        record.validate()?;

        sqlx::query(
            r#"
            INSERT INTO certifications
                (organization, member_id, first_name, last_name, level, expires_at, synced_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (organization, member_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                level = EXCLUDED.level,
                expires_at = EXCLUDED.expires_at,
                synced_at = EXCLUDED.synced_at
            "#,
        )
        .bind(record.organization.as_str())
        .bind(record.member_id)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(record.level)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        organization: Organization,
        member_id: i64,
    ) -> Result<Option<CertificationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT organization, member_id, first_name, last_name, level, expires_at
            FROM certifications
            WHERE organization = $1 AND member_id = $2
            "#,
        )
        .bind(organization.as_str())
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::map_row).transpose()
    }

    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CertificationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT organization, member_id, first_name, last_name, level, expires_at
            FROM certifications
            WHERE lower(last_name) LIKE $1
              AND ($2::TEXT IS NULL OR lower(first_name) LIKE $2)
              AND ($3::TEXT IS NULL OR organization = $3)
            ORDER BY lower(last_name), lower(first_name), organization, member_id
            LIMIT $4
            "#,
        )
        .bind(like_prefix(&filter.last_name_prefix))
        .bind(filter.first_name_prefix.as_deref().map(like_prefix))
        .bind(filter.organization.map(|o| o.as_str()))
        .bind(filter.limit.clamp(1, MAX_SEARCH_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn count(&self, organization: Organization) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM certifications WHERE organization = $1")
                .bind(organization.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
