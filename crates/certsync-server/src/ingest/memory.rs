//! In-process state store and registry
//!
//! Used by the test suites and by `certsync-tick --dry-run`, where nothing
//! should reach the database. The registry can be told to fail writes for
//! chosen member ids.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use certsync_common::types::{CertificationRecord, Organization};
use serde_json::Value;

use super::registry::{CertificationRegistry, SearchFilter};
use super::state_store::StateStore;
use super::{Result, SyncError};

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<Organization, Value>>,
    puts: AtomicUsize,
}

impl MemoryStateStore {
    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, organization: Organization) -> Result<Option<Value>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&organization).cloned())
    }

    async fn put(&self, organization: Organization, state: Value) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(organization, state);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    rows: RwLock<BTreeMap<(Organization, i64), CertificationRecord>>,
    failing: RwLock<HashSet<i64>>,
    upserts: AtomicUsize,
}

impl MemoryRegistry {
    /// Make every subsequent upsert for these member ids fail
    pub fn fail_for(&self, member_ids: impl IntoIterator<Item = i64>) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(member_ids);
    }

    pub fn clear_failures(&self) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Upsert attempts, including failed ones
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<CertificationRecord> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CertificationRegistry for MemoryRegistry {
    async fn upsert(&self, record: &CertificationRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        record.validate()?;

        let failing = self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&record.member_id);
        if failing {
            return Err(SyncError::Database(sqlx::Error::Protocol(format!(
                "write rejected for member {}",
                record.member_id
            ))));
        }

        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn get(
        &self,
        organization: Organization,
        member_id: i64,
    ) -> Result<Option<CertificationRecord>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(&(organization, member_id)).cloned())
    }

    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CertificationRecord>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<_> = rows.values().filter(|r| filter.matches(r)).cloned().collect();
        found.sort_by_cached_key(|r| {
            (
                r.last_name.to_lowercase(),
                r.first_name.to_lowercase(),
                r.organization,
                r.member_id,
            )
        });
        found.truncate(usize::try_from(filter.limit.max(0)).unwrap_or(0));
        Ok(found)
    }

    async fn count(&self, organization: Organization) -> Result<i64> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let count = rows.keys().filter(|(org, _)| *org == organization).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}
