pub mod get_metadata;

pub use get_metadata::{GetSyncMetadataQuery, NarMetadata, SyncMetadata, TraMetadata};
