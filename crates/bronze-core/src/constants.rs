//! Shared constants

/// Top-level prefix of every storage path written by the pipeline.
pub const STORAGE_PREFIX: &str = "bronze";

/// Number of fingerprint hex characters used in storage filenames.
pub const SHORT_FINGERPRINT_LEN: usize = 16;

/// Extension used for file-drop uploads that have none.
pub const DEFAULT_FILE_EXTENSION: &str = "bin";

/// Data version recorded for file-drop uploads.
pub const SFTP_DATA_VERSION: &str = "1.0";

/// `event_type` carried by upload completion events.
pub const SFTP_UPLOAD_EVENT_TYPE: &str = "sftp_upload_complete";

/// `source` carried by upload completion events.
pub const SFTP_UPLOAD_EVENT_SOURCE: &str = "sftp_server";
