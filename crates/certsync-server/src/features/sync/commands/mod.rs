pub mod ingest_snapshot;

pub use ingest_snapshot::IngestSnapshotCommand;
