//! Durable per-organization sync state
//!
//! One JSON blob per organization: the NAR [`ScanCursor`] or the TRA
//! [`FingerprintIndex`]. Writes are last-writer-wins; a blob is only written
//! after the tick that produced it has confirmed its registry writes.

use async_trait::async_trait;
use certsync_common::types::Organization;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};

use super::models::{FingerprintIndex, ScanCursor};
use super::Result;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Raw state for an organization, `None` if it has never been written
    async fn get(&self, organization: Organization) -> Result<Option<Value>>;

    /// Replace the state for an organization
    async fn put(&self, organization: Organization, state: Value) -> Result<()>;
}

/// Load typed state, falling back to the default when absent
pub async fn load<T>(store: &dyn StateStore, organization: Organization) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match store.get(organization).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

pub async fn save<T>(store: &dyn StateStore, organization: Organization, state: &T) -> Result<()>
where
    T: Serialize + Sync,
{
    store.put(organization, serde_json::to_value(state)?).await
}

pub async fn load_cursor(store: &dyn StateStore) -> Result<ScanCursor> {
    load(store, Organization::Nar).await
}

pub async fn load_index(store: &dyn StateStore) -> Result<FingerprintIndex> {
    load(store, Organization::Tra).await
}

/// `sync_state` table backed store
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get(&self, organization: Organization) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT state FROM sync_state WHERE organization = $1")
            .bind(organization.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<Value, _>("state")))
    }

    async fn put(&self, organization: Organization, state: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (organization, state, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization) DO UPDATE
            SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(organization.as_str())
        .bind(state)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
