use async_trait::async_trait;
use bronze_core::{ApiEnvelope, AppError, Fingerprint, LogStatus, NewIngestionRecord, Origin};
use bronze_db::{IngestionLog, MetadataStore};
use bronze_storage::api_storage_key;
use std::sync::Arc;

use super::fail_with;
use crate::runner::EnvelopeProcessor;
use crate::writer::StorageWriter;

/// Processes envelopes published by the request-based front door.
#[derive(Clone)]
pub struct ApiPipeline {
    metadata: Arc<dyn MetadataStore>,
    log: Arc<dyn IngestionLog>,
    writer: StorageWriter,
}

impl ApiPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        log: Arc<dyn IngestionLog>,
        writer: StorageWriter,
    ) -> Self {
        Self {
            metadata,
            log,
            writer,
        }
    }

    /// Process one raw transport message.
    ///
    /// A message that is not a valid envelope is rejected before anything is
    /// logged, since it carries no usable object id.
    #[tracing::instrument(skip(self, raw), fields(size_bytes = raw.len()))]
    pub async fn process(&self, raw: &[u8]) -> Result<(), AppError> {
        let envelope = ApiEnvelope::from_slice(raw)?;
        let object_id = envelope.uuid.clone();

        self.log.log(&object_id, LogStatus::Started, None).await?;

        match self.ingest(&envelope).await {
            Ok(()) => Ok(()),
            Err(e) => Err(fail_with(self.log.as_ref(), &object_id, e).await),
        }
    }

    async fn ingest(&self, envelope: &ApiEnvelope) -> Result<(), AppError> {
        let payload = envelope.decode_body()?;
        let fingerprint = Fingerprint::compute(&payload);
        let path = api_storage_key(
            &envelope.content_type,
            &envelope.format,
            &envelope.subtype,
            &fingerprint,
        )?;

        let record = NewIngestionRecord {
            object_id: envelope.uuid.clone(),
            origin: Origin::Api,
            format: envelope.format.clone(),
            content_type: envelope.content_type.clone(),
            subtype: envelope.subtype.clone(),
            version: envelope.version.clone(),
            storage_path: path.clone(),
            fingerprint,
            source_metadata: envelope.source_metadata(),
        };

        let outcome = self.metadata.record(&record, None).await?;
        tracing::debug!(object_id = %envelope.uuid, outcome = ?outcome, path = %path, "Recorded provenance");

        self.writer.store(&path, payload, &envelope.uuid).await;
        Ok(())
    }
}

#[async_trait]
impl EnvelopeProcessor for ApiPipeline {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn process(&self, payload: &[u8]) -> Result<(), AppError> {
        ApiPipeline::process(self, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockIngestionLog, MockMetadataStore, MockStorage};

    fn pipeline(storage: MockStorage) -> (ApiPipeline, MockIngestionLog, MockMetadataStore) {
        let log = MockIngestionLog::new();
        let metadata = MockMetadataStore::new(log.clone());
        let writer = StorageWriter::new(Arc::new(storage), Arc::new(log.clone()));
        (
            ApiPipeline::new(Arc::new(metadata.clone()), Arc::new(log.clone()), writer),
            log,
            metadata,
        )
    }

    #[tokio::test]
    async fn test_invalid_json_logs_nothing() {
        let (pipeline, log, _) = pipeline(MockStorage::new());
        let result = pipeline.process(b"not json").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(log.all().is_empty());
    }

    #[tokio::test]
    async fn test_bad_base64_logs_failed() {
        let (pipeline, log, metadata) = pipeline(MockStorage::new());
        let raw = br#"{"uuid":"u-1","format":"json","content_type":"fhir","subtype":"patient","body":"%%%"}"#;

        let result = pipeline.process(raw).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert_eq!(log.statuses("u-1"), vec![LogStatus::Started, LogStatus::Failed]);
        assert_eq!(metadata.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_path_segment_is_rejected() {
        let (pipeline, log, _) = pipeline(MockStorage::new());
        let envelope = ApiEnvelope::new("json", "../etc", None, "patient", b"x");

        let result = pipeline.process(&envelope.to_vec().unwrap()).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert_eq!(log.statuses(&envelope.uuid), vec![LogStatus::Started, LogStatus::Failed]);
    }

    #[tokio::test]
    async fn test_missing_version_is_stored_as_null() {
        let storage = MockStorage::new();
        let (pipeline, _, metadata) = pipeline(storage.clone());
        let envelope = ApiEnvelope::new("json", "fhir", None, "patient", b"{}");

        pipeline.process(&envelope.to_vec().unwrap()).await.unwrap();

        let record = metadata
            .find_by_fingerprint(&Fingerprint::compute(b"{}"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.version, None);
        assert_eq!(record.source_metadata["endpoint"], "/ingest/json/fhir/-/patient");
        assert_eq!(record.source_metadata["ingestion_method"], "api");
    }
}
