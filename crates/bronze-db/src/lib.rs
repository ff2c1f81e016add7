//! Bronze DB Library
//!
//! PostgreSQL persistence for ingestion provenance: the deduplicating metadata
//! store, the append-only ingestion log, transaction helpers and schema setup.

pub mod db;
pub mod setup;

pub use db::{
    reduce_latest_per_stage, IngestionLog, IngestionLogRepository, IngestionRecordRepository,
    MetadataStore,
};
pub use setup::setup_database;
