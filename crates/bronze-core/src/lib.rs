//! Bronze Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! the ingestion pipeline, the metadata store and the SFTP front door.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, SftpConfig, StorageConfig, TransportConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    ApiEnvelope, Fingerprint, IngestionLogEntry, IngestionRecord, LogStage, LogStatus,
    NewIngestionRecord, Origin, RecordOutcome, SftpUploadEvent,
};
pub use storage_types::{Compression, StorageBackend};
