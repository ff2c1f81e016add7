//! Storage abstraction trait
//!
//! This module defines the Storage trait that all object storage backends implement.

use crate::{Compression, StorageBackend};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for bronze_core::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => bronze_core::AppError::NotFound(key),
            other => bronze_core::AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// Paths are the logical storage paths derived in [`crate::keys`]. Backends map them
/// onto physical objects, appending the compression suffix when one is configured,
/// so callers never see `.gz`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write bytes to a path, replacing any existing object.
    /// Returns the physical object key.
    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<String>;

    /// Read the bytes at a path, decompressing if needed.
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Check if an object exists at a path
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Delete the object at a path. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Copy a local file into storage without holding it in memory.
    /// Returns the number of source bytes copied.
    async fn copy_from_local(&self, local_path: &Path, path: &str) -> StorageResult<u64>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Compression applied on write
    fn compression(&self) -> Compression;
}
