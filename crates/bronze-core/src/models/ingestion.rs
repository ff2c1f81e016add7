use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::fingerprint::Fingerprint;

/// Front door a payload arrived through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Api,
    Sftp,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Api => "api",
            Origin::Sftp => "sftp",
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Origin::Api),
            "sftp" => Ok(Origin::Sftp),
            _ => Err(anyhow::anyhow!("Invalid ingestion origin: {}", s)),
        }
    }
}

/// Outcome of one pipeline stage, as written to the ingestion log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Started,
    Ingested,
    Duplicate,
    Complete,
    Failed,
    CleanedUp,
    CleanupFailed,
    StorageFailed,
}

/// Logical pipeline stage a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogStage {
    Intake,
    Metadata,
    Storage,
    Cleanup,
}

impl LogStatus {
    pub const ALL: [LogStatus; 8] = [
        LogStatus::Started,
        LogStatus::Ingested,
        LogStatus::Duplicate,
        LogStatus::Complete,
        LogStatus::Failed,
        LogStatus::CleanedUp,
        LogStatus::CleanupFailed,
        LogStatus::StorageFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Started => "started",
            LogStatus::Ingested => "ingested",
            LogStatus::Duplicate => "duplicate",
            LogStatus::Complete => "complete",
            LogStatus::Failed => "failed",
            LogStatus::CleanedUp => "cleaned_up",
            LogStatus::CleanupFailed => "cleanup_failed",
            LogStatus::StorageFailed => "storage_failed",
        }
    }

    /// Stage of a status seen on its own. `failed` can be written by any step,
    /// so without history it is placed on Storage; see [`LogStatus::stage_after`].
    pub fn stage(&self) -> LogStage {
        match self {
            LogStatus::Started => LogStage::Intake,
            LogStatus::Ingested | LogStatus::Duplicate => LogStage::Metadata,
            LogStatus::Complete | LogStatus::Failed | LogStatus::StorageFailed => {
                LogStage::Storage
            }
            LogStatus::CleanedUp | LogStatus::CleanupFailed => LogStage::Cleanup,
        }
    }

    /// Stage of a status given the last stage the object reached before it.
    ///
    /// A `failed` entry before any provenance outcome belongs to Intake (bad
    /// body, unreadable file, metadata error). Once the outcome is logged it
    /// belongs to Storage.
    pub fn stage_after(&self, reached: Option<LogStage>) -> LogStage {
        match (self, reached) {
            (LogStatus::Failed, None | Some(LogStage::Intake)) => LogStage::Intake,
            _ => self.stage(),
        }
    }
}

impl Display for LogStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid ingestion status: {}", s))
    }
}

/// Result of trying to record a fingerprint for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    New,
    Duplicate,
}

impl RecordOutcome {
    pub fn log_status(&self) -> LogStatus {
        match self {
            RecordOutcome::New => LogStatus::Ingested,
            RecordOutcome::Duplicate => LogStatus::Duplicate,
        }
    }
}

/// Provenance row to be inserted for a first-seen fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIngestionRecord {
    pub object_id: String,
    pub origin: Origin,
    pub format: String,
    pub content_type: String,
    pub subtype: String,
    pub version: Option<String>,
    pub storage_path: String,
    pub fingerprint: Fingerprint,
    pub source_metadata: serde_json::Value,
}

/// Persisted provenance row.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionRecord {
    pub object_id: String,
    pub origin: Origin,
    pub format: String,
    pub content_type: String,
    pub subtype: String,
    pub version: Option<String>,
    pub storage_path: String,
    pub fingerprint: Fingerprint,
    pub source_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only log entry. Entries are never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionLogEntry {
    pub id: i64,
    pub object_id: String,
    pub status: LogStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
fn decode_column<T, E>(column: &str, value: Result<T, E>) -> Result<T, sqlx::Error>
where
    E: std::fmt::Display,
{
    value.map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.to_string().into(),
    })
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for IngestionRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let origin: String = row.try_get("ingestion_source")?;
        let fingerprint: Vec<u8> = row.try_get("fingerprint")?;
        Ok(IngestionRecord {
            object_id: row.try_get("object_id")?,
            origin: decode_column("ingestion_source", origin.parse())?,
            format: row.try_get("format")?,
            content_type: row.try_get("content_type")?,
            subtype: row.try_get("subtype")?,
            version: row.try_get("data_version")?,
            storage_path: row.try_get("storage_path")?,
            fingerprint: decode_column(
                "fingerprint",
                Fingerprint::from_slice(&fingerprint).ok_or("expected a 32-byte digest"),
            )?,
            source_metadata: row.try_get("source_metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for IngestionLogEntry {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let status: String = row.try_get("status")?;
        Ok(IngestionLogEntry {
            id: row.try_get("id")?,
            object_id: row.try_get("object_id")?,
            status: decode_column("status", status.parse())?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in LogStatus::ALL {
            assert_eq!(status.as_str().parse::<LogStatus>().unwrap(), status);
        }
        assert!("exploded".parse::<LogStatus>().is_err());
    }

    #[test]
    fn test_status_stages() {
        assert_eq!(LogStatus::Started.stage(), LogStage::Intake);
        assert_eq!(LogStatus::Duplicate.stage(), LogStage::Metadata);
        assert_eq!(LogStatus::StorageFailed.stage(), LogStage::Storage);
        assert_eq!(LogStatus::CleanupFailed.stage(), LogStage::Cleanup);
    }

    #[test]
    fn test_failed_stage_follows_history() {
        assert_eq!(LogStatus::Failed.stage_after(None), LogStage::Intake);
        assert_eq!(
            LogStatus::Failed.stage_after(Some(LogStage::Intake)),
            LogStage::Intake
        );
        assert_eq!(
            LogStatus::Failed.stage_after(Some(LogStage::Metadata)),
            LogStage::Storage
        );
        assert_eq!(
            LogStatus::Complete.stage_after(Some(LogStage::Intake)),
            LogStage::Storage
        );
    }

    #[test]
    fn test_outcome_log_status() {
        assert_eq!(RecordOutcome::New.log_status(), LogStatus::Ingested);
        assert_eq!(RecordOutcome::Duplicate.log_status(), LogStatus::Duplicate);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&LogStatus::CleanedUp).unwrap();
        assert_eq!(json, "\"cleaned_up\"");
    }
}
