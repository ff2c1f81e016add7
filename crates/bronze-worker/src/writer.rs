use bronze_core::LogStatus;
use bronze_db::IngestionLog;
use bronze_storage::Storage;
use std::sync::Arc;

/// Persists payload bytes and records the outcome in the ingestion log.
#[derive(Clone)]
pub struct StorageWriter {
    storage: Arc<dyn Storage>,
    log: Arc<dyn IngestionLog>,
}

impl StorageWriter {
    pub fn new(storage: Arc<dyn Storage>, log: Arc<dyn IngestionLog>) -> Self {
        Self { storage, log }
    }

    /// Write `data` to `path`. Returns whether the write succeeded.
    ///
    /// Never returns an error: a failed write becomes a `failed` log entry.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn store(&self, path: &str, data: Vec<u8>, object_id: &str) -> bool {
        let (status, message, stored) = match self.storage.write(path, data).await {
            Ok(key) => {
                tracing::info!(object_id = %object_id, path = %path, key = %key, "Stored payload");
                (LogStatus::Complete, None, true)
            }
            Err(e) => {
                tracing::error!(object_id = %object_id, path = %path, error = %e, "Failed to write payload");
                (LogStatus::Failed, Some(e.to_string()), false)
            }
        };

        if let Err(e) = self.log.log(object_id, status, message.as_deref()).await {
            tracing::error!(
                object_id = %object_id,
                status = %status,
                error = %e,
                "Failed to append ingestion log entry"
            );
        }

        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockIngestionLog, MockStorage};

    #[tokio::test]
    async fn test_store_logs_complete() {
        let storage = MockStorage::new();
        let log = MockIngestionLog::new();
        let writer = StorageWriter::new(Arc::new(storage.clone()), Arc::new(log.clone()));

        assert!(writer.store("bronze/a/b.json", b"{}".to_vec(), "obj").await);
        assert_eq!(storage.get("bronze/a/b.json"), Some(b"{}".to_vec()));
        assert_eq!(log.statuses("obj"), vec![LogStatus::Complete]);
    }

    #[tokio::test]
    async fn test_store_failure_is_logged_not_raised() {
        let log = MockIngestionLog::new();
        let writer = StorageWriter::new(Arc::new(MockStorage::failing()), Arc::new(log.clone()));

        assert!(!writer.store("bronze/a/b.json", b"{}".to_vec(), "obj").await);

        let history = log.entries("obj");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, LogStatus::Failed);
        assert!(history[0].message.as_deref().unwrap_or("").contains("disk full"));
    }

    #[tokio::test]
    async fn test_log_failure_does_not_change_outcome() {
        let writer = StorageWriter::new(
            Arc::new(MockStorage::new()),
            Arc::new(MockIngestionLog::failing()),
        );

        assert!(writer.store("bronze/a/b.json", b"{}".to_vec(), "obj").await);
    }
}
