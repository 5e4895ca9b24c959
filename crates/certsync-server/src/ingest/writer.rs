//! Batch upsert writer
//!
//! Issues one upsert per record with bounded concurrency and waits for all of
//! them to settle. A failed write never cancels its siblings; the caller gets
//! the exact split between written and failed records.

use std::sync::Arc;

use certsync_common::types::CertificationRecord;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::registry::CertificationRegistry;

/// A write that did not land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    pub member_id: i64,
    pub error: String,
}

/// Outcome of a batch
///
/// `written` holds indices into the submitted slice, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub written: Vec<usize>,
    pub failed: Vec<FailedWrite>,
}

impl UpsertOutcome {
    pub fn all_written(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<i64> {
        self.failed.iter().map(|f| f.member_id).collect()
    }
}

#[derive(Clone)]
pub struct BatchUpsertWriter {
    registry: Arc<dyn CertificationRegistry>,
    concurrency: usize,
}

impl BatchUpsertWriter {
    pub fn new(registry: Arc<dyn CertificationRegistry>, concurrency: usize) -> Self {
        Self {
            registry,
            concurrency: concurrency.max(1),
        }
    }

    /// Upsert every record; returns only after each write has settled
    pub async fn write(&self, records: &[CertificationRecord]) -> UpsertOutcome {
        if records.is_empty() {
            return UpsertOutcome::default();
        }

        let results: Vec<_> = stream::iter(records.iter().cloned().enumerate())
            .map(|(index, record)| {
                let registry = Arc::clone(&self.registry);
                async move { (index, registry.upsert(&record).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = UpsertOutcome::default();
        for (index, result) in results {
            match result {
                Ok(()) => outcome.written.push(index),
                Err(e) => {
                    let record = &records[index];
                    warn!(
                        organization = %record.organization,
                        member_id = record.member_id,
                        error = %e,
                        "Certification upsert failed"
                    );
                    outcome.failed.push(FailedWrite {
                        member_id: record.member_id,
                        error: e.to_string(),
                    });
                },
            }
        }
        outcome.written.sort_unstable();
        outcome.failed.sort_by_key(|f| f.member_id);

        debug!(
            written = outcome.written.len(),
            failed = outcome.failed.len(),
            "Batch upsert settled"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::memory::MemoryRegistry;
    use certsync_common::types::Organization;

    fn records(ids: &[i64]) -> Vec<CertificationRecord> {
        ids.iter()
            .map(|id| CertificationRecord::new(Organization::Tra, *id, "F", "L", 1, 0))
            .collect()
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let registry = Arc::new(MemoryRegistry::default());
        registry.fail_for([3]);
        let writer = BatchUpsertWriter::new(registry.clone(), 2);

        let batch = records(&[1, 2, 3, 4, 5]);
        let outcome = writer.write(&batch).await;

        assert_eq!(outcome.written, vec![0, 1, 3, 4]);
        assert_eq!(outcome.failed_ids(), vec![3]);
        assert!(!outcome.all_written());
        assert_eq!(registry.upsert_count(), 5);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let registry = Arc::new(MemoryRegistry::default());
        let writer = BatchUpsertWriter::new(registry.clone(), 4);
        let outcome = writer.write(&[]).await;
        assert!(outcome.all_written());
        assert_eq!(registry.upsert_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_progresses() {
        let registry = Arc::new(MemoryRegistry::default());
        let writer = BatchUpsertWriter::new(registry, 0);
        let outcome = writer.write(&records(&[7, 8])).await;
        assert_eq!(outcome.written.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_batch_matches_single_application() {
        let mut batch = records(&[1, 2, 3]);
        batch[1].level = 2;
        batch[2].expires_at = 1_900_000_000;

        let once = Arc::new(MemoryRegistry::default());
        BatchUpsertWriter::new(once.clone(), 2).write(&batch).await;

        let repeated = Arc::new(MemoryRegistry::default());
        let writer = BatchUpsertWriter::new(repeated.clone(), 2);
        for _ in 0..3 {
            let outcome = writer.write(&batch).await;
            assert!(outcome.all_written());
        }

        assert_eq!(repeated.upsert_count(), 9);
        assert_eq!(repeated.len(), 3);
        assert_eq!(repeated.records(), once.records());
    }

    #[test]
    fn test_write_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let writer = BatchUpsertWriter::new(Arc::new(MemoryRegistry::default()), 1);
        let batch = records(&[1]);
        assert_send(&writer.write(&batch));
    }
}
