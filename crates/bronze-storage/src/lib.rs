//! Bronze Storage Library
//!
//! This crate provides the object storage adapter used by the ingestion pipeline:
//! the `Storage` trait, local filesystem and S3 backends, optional gzip
//! compression, and the storage path convention.
//!
//! # Storage path format
//!
//! Paths are content-addressed and deterministic:
//!
//! - **Request-based ingestion**: `bronze/{content_type}/{format}/{subtype}/{fp16}.{format}`
//! - **File-drop ingestion**: `bronze/sftp/{username}/{fp16}.{ext}`
//!
//! `fp16` is the first 16 hex characters of the payload's SHA-256 fingerprint.
//! Path derivation is centralized in the `keys` module so both pipelines stay
//! byte-for-byte compatible with data already in storage. When compression is
//! enabled, backends append `.gz` to the physical object name only.

pub mod compression;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use bronze_core::{Compression, StorageBackend};
pub use factory::create_storage;
pub use keys::{
    api_storage_key, guess_content_type, sftp_format, sftp_storage_key, sftp_subtype, KeyError,
};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
