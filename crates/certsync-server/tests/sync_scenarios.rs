//! End-to-end tick scenarios against scripted sources and in-memory storage

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use certsync_common::types::{CertificationRecord, Organization};
use certsync_server::ingest::memory::{MemoryRegistry, MemoryStateStore};
use certsync_server::ingest::nar::{CursorPagedSource, NarClient, ScanPage, ScanRecord};
use certsync_server::ingest::orchestrator::SyncSettings;
use certsync_server::ingest::state_store::{load_cursor, load_index};
use certsync_server::ingest::tra::{Snapshot, SnapshotSource};
use certsync_server::ingest::{
    CertificationRegistry, NarConfig, Pagination, ScanCursor, SyncError, SyncOrchestrator,
    TickState, Watermark,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Scripted sources
// ============================================================================

/// Serves fixed pages by index and records what each request asked for
struct ScriptedNar {
    pages: Vec<ScanPage>,
    requests: Mutex<Vec<(u32, Watermark)>>,
}

impl ScriptedNar {
    fn new(pages: Vec<ScanPage>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(u32, Watermark)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CursorPagedSource for ScriptedNar {
    async fn fetch_next_page(&self, cursor: &ScanCursor) -> Result<ScanPage, SyncError> {
        let page = cursor.next_page();
        self.requests
            .lock()
            .unwrap()
            .push((page, cursor.query_watermark));
        self.pages
            .get(page as usize)
            .cloned()
            .ok_or_else(|| SyncError::Upstream {
                status: 400,
                body: format!("page {} out of range", page),
            })
    }
}

/// Replays queued snapshots, repeating the last one once the queue runs dry
struct ScriptedTra {
    queue: Mutex<VecDeque<Snapshot>>,
    last: Mutex<Snapshot>,
}

impl ScriptedTra {
    fn new(snapshots: Vec<Snapshot>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(snapshots.into()),
            last: Mutex::new(Snapshot::default()),
        })
    }
}

#[async_trait]
impl SnapshotSource for ScriptedTra {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, day, hour, 0, 0).unwrap()
}

fn nar_record(member_id: i64, modified_at: i64) -> ScanRecord {
    ScanRecord {
        record: CertificationRecord::new(Organization::Nar, member_id, "Estes", "Vern", 2, 0),
        watermark: Watermark::new(member_id * 10, modified_at),
    }
}

fn nar_page(current_page: u32, total_pages: u32, records: Vec<ScanRecord>) -> ScanPage {
    let total_results = records.len() as u64;
    ScanPage {
        records,
        pagination: Pagination::new(current_page, total_pages),
        total_results,
        dropped: 0,
    }
}

fn tra_record(member_id: i64, level: i16, expires_at: i64) -> CertificationRecord {
    CertificationRecord::new(Organization::Tra, member_id, "Homer", "Hickam", level, expires_at)
}

fn snapshot(records: Vec<CertificationRecord>) -> Snapshot {
    Snapshot {
        records,
        ..Default::default()
    }
}

struct Harness {
    store: Arc<MemoryStateStore>,
    registry: Arc<MemoryRegistry>,
    orchestrator: SyncOrchestrator,
}

fn harness(settings: SyncSettings) -> Harness {
    let store = Arc::new(MemoryStateStore::default());
    let registry = Arc::new(MemoryRegistry::default());
    let orchestrator = SyncOrchestrator::new(store.clone(), registry.clone(), settings);
    Harness {
        store,
        registry,
        orchestrator,
    }
}

// ============================================================================
// Cursor-paged source
// ============================================================================

#[tokio::test]
async fn test_empty_pass_completes_without_writes() {
    let h = harness(SyncSettings::default());
    let source = ScriptedNar::new(vec![nar_page(0, 0, vec![])]);
    let orchestrator = h.orchestrator.with_nar(source.clone());

    let result = orchestrator
        .tick_organization_at(Organization::Nar, at(1, 0))
        .await
        .unwrap();

    assert!(result.pass_completed);
    assert_eq!(result.written, 0);
    assert_eq!(h.registry.upsert_count(), 0);

    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert!(!cursor.is_scanning());
    assert_eq!(cursor.scan_ended_at, Some(at(1, 0)));
    assert!(cursor.query_watermark.is_zero());
}

#[tokio::test]
async fn test_pass_resumes_page_by_page_and_moves_query_watermark_at_the_end() {
    let h = harness(SyncSettings::default());
    let source = ScriptedNar::new(vec![
        nar_page(0, 3, vec![nar_record(1, 1_000), nar_record(2, 2_000)]),
        nar_page(1, 3, vec![nar_record(3, 3_000)]),
        nar_page(2, 3, vec![nar_record(4, 4_000)]),
    ]);
    let orchestrator = h.orchestrator.with_nar(source.clone());

    let first = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(first[0].state, TickState::ScanningPass);
    assert!(!first[0].pass_completed);

    // State between ticks is all that carries the pass forward
    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert_eq!(cursor.pagination, Some(Pagination::new(0, 3)));
    assert!(cursor.query_watermark.is_zero());
    assert_eq!(cursor.tracking_watermark, Watermark::new(20, 2_000));

    orchestrator.tick_at(at(1, 1)).await;
    let last = orchestrator.tick_at(at(1, 2)).await;
    assert!(last[0].pass_completed);

    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert_eq!(cursor.pagination, None);
    assert_eq!(cursor.query_watermark, Watermark::new(40, 4_000));
    assert!(cursor.tracking_watermark.is_zero());
    assert_eq!(cursor.scan_began_at, Some(at(1, 0)));
    assert_eq!(h.registry.len(), 4);

    // Every page of the pass was requested against the same lower bound
    let requests = source.requests();
    assert_eq!(
        requests,
        vec![
            (0, Watermark::default()),
            (1, Watermark::default()),
            (2, Watermark::default()),
        ]
    );
}

#[tokio::test]
async fn test_query_watermark_never_regresses() {
    let h = harness(SyncSettings::default());
    let source = ScriptedNar::new(vec![nar_page(0, 1, vec![nar_record(5, 9_000)])]);
    let orchestrator = h.orchestrator.with_nar(source.clone());

    orchestrator.tick_at(at(1, 0)).await;
    let after_first = load_cursor(h.store.as_ref()).await.unwrap().query_watermark;

    // Same page again after the cooldown: nothing newer, nothing lower
    let results = orchestrator.tick_at(at(2, 0)).await;
    assert!(results[0].pass_completed);
    let after_second = load_cursor(h.store.as_ref()).await.unwrap().query_watermark;

    assert_eq!(after_first, Watermark::new(50, 9_000));
    assert_eq!(after_second, after_first);
    assert_eq!(source.requests()[1], (0, after_first));
}

#[tokio::test]
async fn test_failed_write_holds_the_page_for_retry() {
    let h = harness(SyncSettings::default());
    let source = ScriptedNar::new(vec![
        nar_page(0, 2, vec![nar_record(1, 1_000), nar_record(2, 2_000), nar_record(3, 3_000)]),
        nar_page(1, 2, vec![nar_record(4, 4_000)]),
    ]);
    let orchestrator = h.orchestrator.with_nar(source.clone());
    h.registry.fail_for([2]);

    let held = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(held[0].written, 2);
    assert_eq!(held[0].failed, vec![2]);

    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert_eq!(cursor.next_page(), 0);
    assert_eq!(h.registry.len(), 2);

    h.registry.clear_failures();
    let retried = orchestrator.tick_at(at(1, 1)).await;
    assert_eq!(retried[0].written, 3);
    assert!(retried[0].failed.is_empty());

    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert_eq!(cursor.next_page(), 1);

    let pages: Vec<u32> = source.requests().iter().map(|(page, _)| *page).collect();
    assert_eq!(pages, vec![0, 0]);
    assert_eq!(h.registry.len(), 3);
}

#[tokio::test]
async fn test_fetch_error_leaves_cursor_untouched() {
    let h = harness(SyncSettings::default());
    let source = ScriptedNar::new(vec![nar_page(0, 5, vec![nar_record(1, 1_000)])]);
    let orchestrator = h.orchestrator.with_nar(source);

    orchestrator.tick_at(at(1, 0)).await;
    let before = load_cursor(h.store.as_ref()).await.unwrap();
    let puts = h.store.put_count();

    // Page 1 is not scripted, so the source errors
    let err = orchestrator
        .tick_organization_at(Organization::Nar, at(1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Upstream { status: 400, .. }));
    assert_eq!(h.store.put_count(), puts);
    assert_eq!(load_cursor(h.store.as_ref()).await.unwrap(), before);
}

fn millis(rfc3339: &str) -> i64 {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().timestamp_millis()
}

#[tokio::test]
async fn test_dropped_results_never_move_the_watermarks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({"pagination": {"currentPage": 0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"currentPage": 0, "totalPages": 2, "totalResults": 4},
            "searchResults": [
                {
                    "Account ID": 10,
                    "Member Number": "100",
                    "First Name": "G. Harry",
                    "Last Name": "Stine",
                    "HPR Level": "1",
                    "Last Modified": "2026-03-01T00:00:00Z"
                },
                {
                    "Account ID": 12,
                    "Member Number": "102",
                    "First Name": "Orville",
                    "Last Name": "Carlisle",
                    "HPR Level": "2",
                    "Last Modified": "2026-03-02T00:00:00Z"
                },
                {
                    "Account ID": 99,
                    "Member Number": "199",
                    "First Name": "No",
                    "HPR Level": "3",
                    "Last Modified": "2026-04-01T00:00:00Z"
                }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({"pagination": {"currentPage": 1}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"currentPage": 1, "totalPages": 2, "totalResults": 4},
            "searchResults": [
                {
                    "Account ID": 11,
                    "Member Number": "101",
                    "First Name": "Vern",
                    "Last Name": "Estes",
                    "HPR Level": "1",
                    "Last Modified": "2026-03-03T00:00:00Z"
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = NarClient::new(NarConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        ..Default::default()
    })
    .unwrap();
    let h = harness(SyncSettings::default());
    let orchestrator = h.orchestrator.with_nar(Arc::new(client));

    let first = orchestrator
        .tick_organization_at(Organization::Nar, at(1, 0))
        .await
        .unwrap();
    assert_eq!(first.dropped, 1);
    assert_eq!(first.written, 2);

    // Only the two valid results feed the running maximum
    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert_eq!(
        cursor.tracking_watermark,
        Watermark::new(12, millis("2026-03-02T00:00:00Z"))
    );
    assert_eq!(cursor.next_page(), 1);

    let last = orchestrator
        .tick_organization_at(Organization::Nar, at(1, 1))
        .await
        .unwrap();
    assert!(last.pass_completed);

    let cursor = load_cursor(h.store.as_ref()).await.unwrap();
    assert_eq!(
        cursor.query_watermark,
        Watermark::new(12, millis("2026-03-03T00:00:00Z"))
    );
    assert!(h.registry.get(Organization::Nar, 199).await.unwrap().is_none());
    assert_eq!(h.registry.len(), 3);
}

// ============================================================================
// Snapshot-diff source
// ============================================================================

#[tokio::test]
async fn test_only_changed_members_are_written() {
    let h = harness(SyncSettings::default());
    let source = ScriptedTra::new(vec![
        snapshot(vec![tra_record(1, 1, 0), tra_record(2, 2, 0), tra_record(3, 3, 0)]),
        // 1 unchanged, 2 re-levelled, 3 renewed
        snapshot(vec![
            tra_record(1, 1, 0),
            tra_record(2, 3, 0),
            tra_record(3, 3, 1_830_297_600_000),
        ]),
    ]);
    let orchestrator = h.orchestrator.with_tra(source);

    let first = orchestrator
        .tick_organization_at(Organization::Tra, at(1, 0))
        .await
        .unwrap();
    assert_eq!(first.written, 3);

    let second = orchestrator
        .tick_organization_at(Organization::Tra, at(1, 1))
        .await
        .unwrap();
    assert_eq!(second.considered, 3);
    assert_eq!(second.changed, 2);
    assert_eq!(second.written, 2);
    assert_eq!(h.registry.upsert_count(), 5);

    let stored = h.registry.get(Organization::Tra, 2).await.unwrap().unwrap();
    assert_eq!(stored.level, 3);
}

#[tokio::test]
async fn test_name_only_changes_are_not_rewritten() {
    let h = harness(SyncSettings::default());
    let renamed = CertificationRecord::new(Organization::Tra, 1, "H.", "Hickam", 1, 0);
    let source = ScriptedTra::new(vec![
        snapshot(vec![tra_record(1, 1, 0)]),
        snapshot(vec![renamed]),
    ]);
    let orchestrator = h.orchestrator.with_tra(source);

    orchestrator
        .tick_organization_at(Organization::Tra, at(1, 0))
        .await
        .unwrap();
    let second = orchestrator
        .tick_organization_at(Organization::Tra, at(1, 1))
        .await
        .unwrap();
    assert_eq!(second.changed, 0);
    assert_eq!(h.registry.upsert_count(), 1);
}

#[tokio::test]
async fn test_batch_cap_defers_the_rest_to_later_ticks() {
    let settings = SyncSettings {
        batch_cap: 2,
        ..Default::default()
    };
    let h = harness(settings);
    let source = ScriptedTra::new(vec![snapshot((1..=5).map(|id| tra_record(id, 2, 0)).collect())]);
    let orchestrator = h.orchestrator.with_tra(source);

    let first = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(first[0].changed, 5);
    assert_eq!(first[0].written, 2);
    assert_eq!(load_index(h.store.as_ref()).await.unwrap().pending, 3);

    // Pending work makes the next tick due well inside the refresh interval
    let second = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(second[0].state, TickState::SnapshotTick);
    assert_eq!(second[0].changed, 3);
    assert_eq!(second[0].written, 2);

    let third = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(third[0].written, 1);

    let index = load_index(h.store.as_ref()).await.unwrap();
    assert_eq!(index.pending, 0);
    assert_eq!(index.len(), 5);
    assert_eq!(h.registry.len(), 5);

    let fourth = orchestrator.tick_at(at(1, 1)).await;
    assert_eq!(fourth[0].state, TickState::IdleWait);
}

#[tokio::test]
async fn test_failed_member_is_retried_next_tick() {
    let h = harness(SyncSettings::default());
    let source = ScriptedTra::new(vec![snapshot(vec![
        tra_record(1, 1, 0),
        tra_record(2, 2, 0),
        tra_record(3, 3, 0),
    ])]);
    let orchestrator = h.orchestrator.with_tra(source);
    h.registry.fail_for([3]);

    let first = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(first[0].written, 2);
    assert_eq!(first[0].failed, vec![3]);

    let index = load_index(h.store.as_ref()).await.unwrap();
    assert_eq!(index.get(3), None);
    assert_eq!(index.pending, 1);

    h.registry.clear_failures();
    let second = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(second[0].changed, 1);
    assert_eq!(second[0].written, 1);
    assert!(h.registry.get(Organization::Tra, 3).await.unwrap().is_some());
}

#[tokio::test]
async fn test_published_at_is_kept_when_a_dump_omits_it() {
    let h = harness(SyncSettings::default());
    let published = Some(at(1, 6));
    let orchestrator = h.orchestrator;

    orchestrator
        .ingest_snapshot(Snapshot {
            records: vec![tra_record(1, 1, 0)],
            published_at: published,
            ..Default::default()
        })
        .await
        .unwrap();
    orchestrator
        .ingest_snapshot(snapshot(vec![tra_record(1, 1, 0)]))
        .await
        .unwrap();

    assert_eq!(load_index(h.store.as_ref()).await.unwrap().published_at, published);
}

// ============================================================================
// Both sources
// ============================================================================

#[tokio::test]
async fn test_one_failing_organization_does_not_stop_the_other() {
    let h = harness(SyncSettings::default());
    let nar = ScriptedNar::new(vec![]);
    let tra = ScriptedTra::new(vec![snapshot(vec![tra_record(1, 1, 0)])]);
    let orchestrator = h.orchestrator.with_nar(nar).with_tra(tra);

    let results = orchestrator.tick_at(at(1, 0)).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].organization, Organization::Tra);
    assert_eq!(h.registry.len(), 1);
}

#[tokio::test]
async fn test_overlapping_ticks_converge() {
    let h = harness(SyncSettings::default());
    let tra = ScriptedTra::new(vec![snapshot((1..=4).map(|id| tra_record(id, 1, 0)).collect())]);
    let orchestrator = h.orchestrator.with_tra(tra);

    let (a, b) = tokio::join!(
        orchestrator.tick_organization_at(Organization::Tra, at(1, 0)),
        orchestrator.tick_organization_at(Organization::Tra, at(1, 0)),
    );
    assert!(a.is_ok() && b.is_ok());

    // Duplicate work is allowed; the registry still holds one row per member
    assert_eq!(h.registry.len(), 4);
    assert_eq!(load_index(h.store.as_ref()).await.unwrap().len(), 4);
}
