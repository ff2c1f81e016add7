//! Storage path derivation shared by both ingestion pipelines.
//!
//! Format: `bronze/{category segments...}/{fp16}.{ext}`. The output must stay
//! byte-for-byte stable; existing stored objects are addressed by it.

use bronze_core::constants::{DEFAULT_FILE_EXTENSION, STORAGE_PREFIX};
use bronze_core::Fingerprint;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid {field} path segment: {value:?}")]
    InvalidSegment { field: &'static str, value: String },
}

impl From<KeyError> for bronze_core::AppError {
    fn from(err: KeyError) -> Self {
        bronze_core::AppError::InvalidInput(err.to_string())
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() || value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(KeyError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Storage path for a payload received through the request-based front door.
///
/// `bronze/{content_type}/{format}/{subtype}/{fp16}.{lowercase format}`
pub fn api_storage_key(
    content_type: &str,
    format: &str,
    subtype: &str,
    fingerprint: &Fingerprint,
) -> Result<String, KeyError> {
    check_segment("content_type", content_type)?;
    check_segment("format", format)?;
    check_segment("subtype", subtype)?;

    Ok([
        STORAGE_PREFIX,
        content_type,
        format,
        subtype,
        &format!("{}.{}", fingerprint.short_hex(), format.to_lowercase()),
    ]
    .join("/"))
}

/// Extension of the uploaded filename without the dot, or `bin` when there is none.
pub fn file_extension(original_path: &str) -> String {
    Path::new(original_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_FILE_EXTENSION)
        .to_string()
}

/// Storage path for a file landed through the file-drop front door.
///
/// `bronze/sftp/{username}/{fp16}.{ext}`
pub fn sftp_storage_key(
    original_path: &str,
    username: &str,
    fingerprint: &Fingerprint,
) -> Result<String, KeyError> {
    check_segment("username", username)?;
    let ext = file_extension(original_path);
    check_segment("extension", &ext)?;

    Ok([
        STORAGE_PREFIX,
        "sftp",
        username,
        &format!("{}.{}", fingerprint.short_hex(), ext),
    ]
    .join("/"))
}

/// Format recorded for a file-drop upload: the lowercase extension, or `unknown`.
pub fn sftp_format(original_path: &str) -> String {
    Path::new(original_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Content-type category for a file-drop upload, guessed from its extension.
pub fn guess_content_type(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "json" => "json",
        "xml" => "xml",
        "txt" | "csv" => "text",
        _ => "binary",
    }
}

/// Subtype recorded for a file-drop upload: the filename stem.
pub fn sftp_subtype(original_path: &str) -> String {
    Path::new(original_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("document")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_layout() {
        let fp = Fingerprint::compute(b"hello");
        let key = api_storage_key("fhir", "json", "patient", &fp).unwrap();
        assert_eq!(key, "bronze/fhir/json/patient/2cf24dba5fb0a30e.json");
    }

    #[test]
    fn test_api_key_lowercases_extension_only() {
        let fp = Fingerprint::compute(b"<a/>");
        let key = api_storage_key("hl7", "XML", "lab", &fp).unwrap();
        assert!(key.starts_with("bronze/hl7/XML/lab/"));
        assert!(key.ends_with(".xml"));
    }

    #[test]
    fn test_api_key_is_deterministic() {
        let a = api_storage_key("fhir", "json", "patient", &Fingerprint::compute(b"x")).unwrap();
        let b = api_storage_key("fhir", "json", "patient", &Fingerprint::compute(b"x")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_api_key_rejects_bad_segments() {
        let fp = Fingerprint::compute(b"x");
        assert!(api_storage_key("", "json", "patient", &fp).is_err());
        assert!(api_storage_key("fhir", "json", "..", &fp).is_err());
        assert!(api_storage_key("fhir/../..", "json", "p", &fp).is_err());
    }

    #[test]
    fn test_sftp_key_empty_file_without_extension() {
        let fp = Fingerprint::compute(b"");
        let key = sftp_storage_key("/uploads/bob/README", "bob", &fp).unwrap();
        assert_eq!(key, "bronze/sftp/bob/e3b0c44298fc1c14.bin");
    }

    #[test]
    fn test_sftp_key_keeps_extension() {
        let fp = Fingerprint::compute(b"a,b\n");
        let key = sftp_storage_key("/uploads/alice/data/labs.csv", "alice", &fp).unwrap();
        assert_eq!(key, format!("bronze/sftp/alice/{}.csv", fp.short_hex()));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("json"), "json");
        assert_eq!(guess_content_type("CSV"), "text");
        assert_eq!(guess_content_type("txt"), "text");
        assert_eq!(guess_content_type("xml"), "xml");
        assert_eq!(guess_content_type("dcm"), "binary");
        assert_eq!(guess_content_type(""), "binary");
    }

    #[test]
    fn test_sftp_subtype() {
        assert_eq!(sftp_subtype("/uploads/bob/labs.csv"), "labs");
        assert_eq!(sftp_subtype("/uploads/bob/archive.tar.gz"), "archive.tar");
        assert_eq!(file_extension("/uploads/bob/archive.tar.gz"), "gz");
        assert_eq!(sftp_format("/uploads/bob/Scan.DCM"), "dcm");
        assert_eq!(sftp_format("/uploads/bob/README"), "unknown");
    }
}
