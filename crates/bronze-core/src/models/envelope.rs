//! Envelopes delivered to the pipeline by the two front doors.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::constants::{SFTP_UPLOAD_EVENT_SOURCE, SFTP_UPLOAD_EVENT_TYPE};
use crate::error::AppError;

/// Envelope published by the request-based front door.
///
/// `body` is the base64 encoding of the inline payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub uuid: String,
    pub format: String,
    pub content_type: String,
    #[serde(default)]
    pub version: Option<String>,
    pub subtype: String,
    pub body: String,
}

impl ApiEnvelope {
    /// Build an envelope around a raw payload with a fresh identifier.
    pub fn new(
        format: impl Into<String>,
        content_type: impl Into<String>,
        version: Option<String>,
        subtype: impl Into<String>,
        payload: &[u8],
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            format: format.into(),
            content_type: content_type.into(),
            version,
            subtype: subtype.into(),
            body: STANDARD.encode(payload),
        }
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, AppError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode the inline payload into the bytes that will be stored.
    pub fn decode_body(&self) -> Result<Vec<u8>, AppError> {
        Ok(STANDARD.decode(self.body.as_bytes())?)
    }

    /// Origin-specific metadata stored alongside the provenance row.
    pub fn source_metadata(&self) -> serde_json::Value {
        let version = self.version.as_deref().unwrap_or("-");
        json!({
            "ingestion_method": "api",
            "endpoint": format!(
                "/ingest/{}/{}/{}/{}",
                self.format, self.content_type, version, self.subtype
            ),
            "format": self.format,
            "content_type": self.content_type,
            "subtype": self.subtype,
            "version": self.version,
        })
    }
}

fn unknown_user() -> String {
    "unknown".to_string()
}

/// File-landed event published by the file-drop front door.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SftpUploadEvent {
    pub path: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub event_type: String,
    #[serde(default = "unknown_user")]
    pub username: String,
    #[serde(default)]
    pub source: String,
}

impl SftpUploadEvent {
    pub fn new(path: impl Into<String>, size: u64, timestamp: f64, username: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            timestamp,
            size,
            event_type: SFTP_UPLOAD_EVENT_TYPE.to_string(),
            username: username.into(),
            source: SFTP_UPLOAD_EVENT_SOURCE.to_string(),
        }
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, AppError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_json::to_vec(self)?)
    }
}
