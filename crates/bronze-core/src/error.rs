//! Error types module
//!
//! All pipeline errors are unified under `AppError`. The variants follow the
//! ingestion error taxonomy: infrastructure failures (database, storage, transport)
//! are recoverable, bad input is not, and duplicates are not errors at all.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors such as malformed envelopes
    Debug,
    /// Recoverable issues such as a vanished upload
    Warn,
    /// Unexpected failures
    Error,
}

/// How the consumer loop should treat an error.
pub trait ErrorMetadata {
    /// Stable code for log queries, e.g. `STORAGE_ERROR`.
    fn error_code(&self) -> &'static str;

    /// Infrastructure failures that may succeed on a later attempt.
    fn is_recoverable(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(err.to_string()),
            _ => AppError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::InvalidInput(format!("Base64 decoding error: {}", err))
    }
}

/// (error_code, recoverable, log_level) for each variant.
fn app_error_static_metadata(err: &AppError) -> (&'static str, bool, LogLevel) {
    match err {
        AppError::Database(_) => ("DATABASE_ERROR", true, LogLevel::Error),
        AppError::Storage(_) => ("STORAGE_ERROR", true, LogLevel::Error),
        AppError::Transport(_) => ("TRANSPORT_ERROR", true, LogLevel::Error),
        AppError::InvalidInput(_) => ("INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => ("NOT_FOUND", false, LogLevel::Warn),
        AppError::PayloadTooLarge(_) => ("PAYLOAD_TOO_LARGE", false, LogLevel::Warn),
        AppError::Internal(_) => ("INTERNAL_ERROR", true, LogLevel::Error),
        AppError::InternalWithSource { .. } => ("INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl AppError {
    /// The error and its sources on one line, outermost first.
    pub fn error_chain(&self) -> String {
        use std::error::Error;

        let mut parts = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            if parts.len() > MAX_CHAIN_DEPTH {
                parts.push("...".to_string());
                break;
            }
            let text = err.to_string();
            if parts.last() != Some(&text) {
                parts.push(text);
            }
            source = err.source();
        }

        parts.join(": ")
    }
}

const MAX_CHAIN_DEPTH: usize = 5;

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = AppError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_chain_includes_source() {
        let err = AppError::from(anyhow::anyhow!("root cause").context("outer"));
        let chain = err.error_chain();
        assert!(chain.starts_with("Internal error with source"));
        assert!(chain.contains("outer"));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_invalid_input_is_not_recoverable() {
        let err = AppError::InvalidInput("bad envelope".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }
}
