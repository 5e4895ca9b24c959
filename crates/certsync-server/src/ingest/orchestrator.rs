//! Sync orchestrator
//!
//! One tick per organization: load state, decide whether there is work, pull
//! one unit from the source, write it, then persist state reflecting only the
//! writes that landed. Nothing is persisted before the writer returns, so a
//! tick that fails or times out leaves the previous state intact and the next
//! tick simply retries.
//!
//! Overlapping ticks are tolerated rather than prevented: upserts are
//! idempotent and state is last-writer-wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use certsync_common::types::{CertificationRecord, Organization};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use super::change_detector::{filter_changed, record_fingerprint};
use super::config::IngestConfig;
use super::models::{FingerprintIndex, Pagination, SyncRunResult, TickState, Watermark};
use super::nar::{CursorPagedSource, NarClient};
use super::registry::{CertificationRegistry, PgCertificationRegistry};
use super::state_store::{self, PgStateStore, StateStore};
use super::tra::{Snapshot, SnapshotSource, TraClient};
use super::writer::BatchUpsertWriter;
use super::{Result, SyncError};

/// Tunables the orchestrator needs from [`IngestConfig`]
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub batch_cap: usize,
    pub write_concurrency: usize,
    pub tick_timeout: Duration,
    pub nar_idle_interval: chrono::Duration,
    pub tra_refresh_interval: chrono::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for SyncSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_cap: config.batch_cap,
            write_concurrency: config.write_concurrency,
            tick_timeout: config.tick_timeout(),
            nar_idle_interval: config.nar.idle_interval(),
            tra_refresh_interval: config.tra.refresh_interval(),
        }
    }
}

pub struct SyncOrchestrator {
    store: Arc<dyn StateStore>,
    writer: BatchUpsertWriter,
    nar: Option<Arc<dyn CursorPagedSource>>,
    tra: Option<Arc<dyn SnapshotSource>>,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    /// Orchestrator with no sources attached
    pub fn new(
        store: Arc<dyn StateStore>,
        registry: Arc<dyn CertificationRegistry>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            writer: BatchUpsertWriter::new(registry, settings.write_concurrency),
            nar: None,
            tra: None,
            settings,
        }
    }

    pub fn with_nar(mut self, source: Arc<dyn CursorPagedSource>) -> Self {
        self.nar = Some(source);
        self
    }

    pub fn with_tra(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.tra = Some(source);
        self
    }

    /// Postgres-backed orchestrator with the HTTP clients of every enabled source
    pub fn from_config(config: &IngestConfig, pool: PgPool) -> Result<Self> {
        Self::from_config_with(
            config,
            Arc::new(PgStateStore::new(pool.clone())),
            Arc::new(PgCertificationRegistry::new(pool)),
        )
    }

    /// HTTP clients of every enabled source over the given store and registry
    pub fn from_config_with(
        config: &IngestConfig,
        store: Arc<dyn StateStore>,
        registry: Arc<dyn CertificationRegistry>,
    ) -> Result<Self> {
        let mut orchestrator = Self::new(store, registry, SyncSettings::from(config));

        if config.nar.enabled {
            orchestrator = orchestrator.with_nar(Arc::new(NarClient::new(config.nar.clone())?));
        }
        if config.tra.enabled {
            orchestrator = orchestrator.with_tra(Arc::new(TraClient::new(config.tra.clone())?));
        }
        Ok(orchestrator)
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Organizations with an attached source, in tick order
    pub fn organizations(&self) -> Vec<Organization> {
        Organization::ALL
            .into_iter()
            .filter(|org| self.has_source(*org))
            .collect()
    }

    fn has_source(&self, organization: Organization) -> bool {
        match organization {
            Organization::Nar => self.nar.is_some(),
            Organization::Tra => self.tra.is_some(),
        }
    }

    /// Run every due organization once
    ///
    /// Failures are logged and leave that organization out of the results;
    /// they never stop the other organization from ticking.
    pub async fn tick(&self) -> Vec<SyncRunResult> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<SyncRunResult> {
        let mut results = Vec::new();
        for organization in self.organizations() {
            match self.run_bounded(organization, now, false).await {
                Ok(result) => results.push(result),
                Err(e) => error!(%organization, error = %e, "Sync tick failed"),
            }
        }
        results
    }

    /// Tick one organization regardless of its refresh schedule
    ///
    /// A NAR pass cooldown is still honored.
    pub async fn tick_organization(&self, organization: Organization) -> Result<SyncRunResult> {
        self.tick_organization_at(organization, Utc::now()).await
    }

    pub async fn tick_organization_at(
        &self,
        organization: Organization,
        now: DateTime<Utc>,
    ) -> Result<SyncRunResult> {
        if !self.has_source(organization) {
            return Err(SyncError::Config(format!("{} sync is not enabled", organization)));
        }
        self.run_bounded(organization, now, true).await
    }

    /// Diff and write a snapshot supplied by the caller instead of downloaded
    pub async fn ingest_snapshot(&self, snapshot: Snapshot) -> Result<SyncRunResult> {
        let started = Instant::now();
        let now = Utc::now();
        self.bounded(async {
            let index = state_store::load_index(self.store.as_ref()).await?;
            self.apply_snapshot(index, snapshot, now, started).await
        })
        .await
    }

    async fn run_bounded(
        &self,
        organization: Organization,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<SyncRunResult> {
        match organization {
            Organization::Nar => self.bounded(self.run_nar(now)).await,
            Organization::Tra => self.bounded(self.run_tra(now, force)).await,
        }
    }

    async fn bounded<F>(&self, tick: F) -> Result<SyncRunResult>
    where
        F: std::future::Future<Output = Result<SyncRunResult>>,
    {
        tokio::time::timeout(self.settings.tick_timeout, tick)
            .await
            .map_err(|_| SyncError::Timeout(self.settings.tick_timeout.as_secs()))?
    }

    async fn run_nar(&self, now: DateTime<Utc>) -> Result<SyncRunResult> {
        let started = Instant::now();
        let source = self
            .nar
            .as_ref()
            .ok_or_else(|| SyncError::Config("NAR sync is not enabled".to_string()))?;

        let mut cursor = state_store::load_cursor(self.store.as_ref()).await?;
        if cursor.is_idle(now, self.settings.nar_idle_interval) {
            debug!(scan_ended_at = ?cursor.scan_ended_at, "NAR pass cooling down");
            return Ok(SyncRunResult::idle(Organization::Nar).finish(started));
        }

        let page_number = cursor.next_page();
        let page = source.fetch_next_page(&cursor).await?;

        let records: Vec<CertificationRecord> =
            page.records.iter().map(|r| r.record.clone()).collect();
        let outcome = self.writer.write(&records).await;

        let written_watermark = outcome
            .written
            .iter()
            .map(|&i| page.records[i].watermark)
            .fold(Watermark::default(), Watermark::max);

        let mut result = SyncRunResult::new(Organization::Nar, TickState::ScanningPass);
        result.considered = page.records.len();
        result.changed = page.records.len();
        result.written = outcome.written.len();
        result.failed = outcome.failed_ids();
        result.dropped = page.dropped;

        if outcome.all_written() {
            let pagination = Pagination::new(page_number, page.pagination.total_pages);
            result.pass_completed = cursor.apply_page(pagination, written_watermark, now);
            if result.pass_completed {
                info!(
                    query_watermark = ?cursor.query_watermark,
                    "NAR pass completed"
                );
            }
        } else {
            warn!(
                page = page_number,
                failed = outcome.failed.len(),
                "Holding NAR page for retry"
            );
            cursor.hold_page(written_watermark, now);
        }

        state_store::save(self.store.as_ref(), Organization::Nar, &cursor).await?;
        Ok(result.finish(started))
    }

    async fn run_tra(&self, now: DateTime<Utc>, force: bool) -> Result<SyncRunResult> {
        let started = Instant::now();
        let source = self
            .tra
            .as_ref()
            .ok_or_else(|| SyncError::Config("TRA sync is not enabled".to_string()))?;

        let index = state_store::load_index(self.store.as_ref()).await?;
        if !force && !index.is_due(now, self.settings.tra_refresh_interval) {
            debug!(last_tick_at = ?index.last_tick_at, "TRA snapshot not due");
            return Ok(SyncRunResult::idle(Organization::Tra).finish(started));
        }

        let snapshot = source.fetch_snapshot().await?;
        self.apply_snapshot(index, snapshot, now, started).await
    }

    async fn apply_snapshot(
        &self,
        mut index: FingerprintIndex,
        snapshot: Snapshot,
        now: DateTime<Utc>,
        started: Instant,
    ) -> Result<SyncRunResult> {
        let mut result = SyncRunResult::new(Organization::Tra, TickState::SnapshotTick);
        result.considered = snapshot.records.len();
        result.dropped = snapshot.dropped;

        let mut changed = filter_changed(snapshot.records, &index);
        result.changed = changed.len();
        if changed.len() > self.settings.batch_cap {
            debug!(
                changed = changed.len(),
                cap = self.settings.batch_cap,
                "Deferring changed TRA members to later ticks"
            );
            changed.truncate(self.settings.batch_cap);
        }

        let outcome = self.writer.write(&changed).await;
        for &i in &outcome.written {
            let record = &changed[i];
            index.record(record.member_id, record_fingerprint(record), now);
        }

        result.written = outcome.written.len();
        result.failed = outcome.failed_ids();

        index.pending = result.changed - result.written;
        index.last_tick_at = Some(now);
        if snapshot.published_at.is_some() {
            index.published_at = snapshot.published_at;
        }

        state_store::save(self.store.as_ref(), Organization::Tra, &index).await?;
        Ok(result.finish(started))
    }
}
