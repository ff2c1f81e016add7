//! Database repositories for data access layer
//!
//! Each repository owns a `PgPool` and exposes its operations through a trait so
//! the pipelines can run against in-memory implementations in tests.
//
// Ingestion provenance (records + log)
pub mod ingestion;
//
// Transaction utilities
pub mod transaction;

pub use ingestion::{
    reduce_latest_per_stage, IngestionLog, IngestionLogRepository, IngestionRecordRepository,
    MetadataStore,
};
