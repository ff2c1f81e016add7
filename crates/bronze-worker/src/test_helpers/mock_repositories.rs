//! Mock repository implementations for testing

use async_trait::async_trait;
use bronze_core::{
    AppError, Fingerprint, IngestionLogEntry, IngestionRecord, LogStatus, NewIngestionRecord,
    RecordOutcome,
};
use bronze_db::{IngestionLog, MetadataStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock ingestion log. Entries get increasing ids in append order.
#[derive(Clone, Default)]
pub struct MockIngestionLog {
    entries: Arc<Mutex<Vec<IngestionLogEntry>>>,
    fail: bool,
}

impl MockIngestionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log whose appends always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn entries(&self, object_id: &str) -> Vec<IngestionLogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.object_id == object_id)
            .cloned()
            .collect()
    }

    pub fn statuses(&self, object_id: &str) -> Vec<LogStatus> {
        self.entries(object_id).into_iter().map(|e| e.status).collect()
    }

    pub fn all(&self) -> Vec<IngestionLogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Object ids in order of their first entry.
    pub fn object_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for entry in self.entries.lock().unwrap().iter() {
            if !ids.contains(&entry.object_id) {
                ids.push(entry.object_id.clone());
            }
        }
        ids
    }
}

#[async_trait]
impl IngestionLog for MockIngestionLog {
    async fn log(
        &self,
        object_id: &str,
        status: LogStatus,
        message: Option<&str>,
    ) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Internal("ingestion log unavailable".to_string()));
        }

        let mut entries = self.entries.lock().unwrap();
        let id = entries.len() as i64 + 1;
        entries.push(IngestionLogEntry {
            id,
            object_id: object_id.to_string(),
            status,
            message: message.map(String::from),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn history(&self, object_id: &str) -> Result<Vec<IngestionLogEntry>, AppError> {
        Ok(self.entries(object_id))
    }
}

/// Mock metadata store keyed by fingerprint. Appends its log entries to the
/// shared [`MockIngestionLog`] the same way the Postgres repository does.
#[derive(Clone)]
pub struct MockMetadataStore {
    records: Arc<Mutex<HashMap<Fingerprint, IngestionRecord>>>,
    log: MockIngestionLog,
}

impl MockMetadataStore {
    pub fn new(log: MockIngestionLog) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            log,
        }
    }

    pub fn records(&self) -> Vec<IngestionRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl MetadataStore for MockMetadataStore {
    async fn record(
        &self,
        record: &NewIngestionRecord,
        message: Option<&str>,
    ) -> Result<RecordOutcome, AppError> {
        let outcome = {
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&record.fingerprint) {
                RecordOutcome::Duplicate
            } else {
                records.insert(
                    record.fingerprint,
                    IngestionRecord {
                        object_id: record.object_id.clone(),
                        origin: record.origin,
                        format: record.format.clone(),
                        content_type: record.content_type.clone(),
                        subtype: record.subtype.clone(),
                        version: record.version.clone(),
                        storage_path: record.storage_path.clone(),
                        fingerprint: record.fingerprint,
                        source_metadata: record.source_metadata.clone(),
                        created_at: Utc::now(),
                    },
                );
                RecordOutcome::New
            }
        };

        self.log
            .log(&record.object_id, outcome.log_status(), message)
            .await?;
        Ok(outcome)
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IngestionRecord>, AppError> {
        Ok(self.records.lock().unwrap().get(fingerprint).cloned())
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(self.records.lock().unwrap().len() as i64)
    }
}
