use async_trait::async_trait;
use bronze_core::constants::SFTP_DATA_VERSION;
use bronze_core::{AppError, Fingerprint, LogStatus, NewIngestionRecord, Origin, SftpUploadEvent};
use bronze_db::{IngestionLog, MetadataStore};
use bronze_storage::{guess_content_type, sftp_format, sftp_storage_key, sftp_subtype};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use super::fail_with;
use crate::runner::EnvelopeProcessor;
use crate::writer::StorageWriter;

const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SftpPipelineConfig {
    /// Events for paths outside this directory are rejected.
    pub upload_root: PathBuf,
    /// Landed files larger than this are refused and left in place.
    pub max_file_bytes: u64,
}

impl SftpPipelineConfig {
    pub fn new(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Processes upload completion events from the file-drop front door.
///
/// The landed file is moved aside under a name unique to the object before it
/// is read, so a new upload to the same name is never mistaken for it. The
/// claimed file is removed only after its bytes were written to storage;
/// otherwise it is put back.
#[derive(Clone)]
pub struct SftpPipeline {
    metadata: Arc<dyn MetadataStore>,
    log: Arc<dyn IngestionLog>,
    writer: StorageWriter,
    config: SftpPipelineConfig,
}

impl SftpPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        log: Arc<dyn IngestionLog>,
        writer: StorageWriter,
        config: SftpPipelineConfig,
    ) -> Self {
        Self {
            metadata,
            log,
            writer,
            config,
        }
    }

    #[tracing::instrument(skip(self, raw), fields(size_bytes = raw.len()))]
    pub async fn process(&self, raw: &[u8]) -> Result<(), AppError> {
        let event = SftpUploadEvent::from_slice(raw)?;
        let object_id = Uuid::new_v4().to_string();

        self.log.log(&object_id, LogStatus::Started, None).await?;

        tracing::info!(
            object_id = %object_id,
            path = %event.path,
            size = event.size,
            username = %event.username,
            "Processing SFTP file"
        );

        match self.ingest(&object_id, &event).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(object_id = %object_id, path = %event.path, error = %e, "Failed to process SFTP file");
                Err(fail_with(self.log.as_ref(), &object_id, e).await)
            }
        }
    }

    async fn ingest(&self, object_id: &str, event: &SftpUploadEvent) -> Result<(), AppError> {
        let claim = ClaimedFile::claim(
            Path::new(&event.path),
            &self.config.upload_root,
            object_id,
            self.config.max_file_bytes,
        )
        .await?;

        match self.ingest_claimed(object_id, event, &claim).await {
            Ok(true) => self.cleanup(object_id, &event.path, claim).await,
            Ok(false) => {
                claim.restore(object_id).await;
                tracing::warn!(object_id = %object_id, path = %event.path, "Storage write failed, keeping original file");
                self.log
                    .log(
                        object_id,
                        LogStatus::StorageFailed,
                        Some(&format!("Storage write failed; original file kept: {}", event.path)),
                    )
                    .await
            }
            Err(e) => {
                claim.restore(object_id).await;
                Err(e)
            }
        }
    }

    /// Record and store the claimed bytes. Returns whether the write succeeded.
    async fn ingest_claimed(
        &self,
        object_id: &str,
        event: &SftpUploadEvent,
        claim: &ClaimedFile,
    ) -> Result<bool, AppError> {
        let payload = claim.read(self.config.max_file_bytes).await?;
        let fingerprint = Fingerprint::compute(&payload);
        let path = sftp_storage_key(&event.path, &event.username, &fingerprint)?;

        let format = sftp_format(&event.path);
        let original_filename = Path::new(&event.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let record = NewIngestionRecord {
            object_id: object_id.to_string(),
            origin: Origin::Sftp,
            content_type: guess_content_type(&format).to_string(),
            format,
            subtype: sftp_subtype(&event.path),
            version: Some(SFTP_DATA_VERSION.to_string()),
            storage_path: path.clone(),
            fingerprint,
            source_metadata: json!({
                "username": event.username,
                "original_path": event.path,
                "original_filename": original_filename,
                "file_size": event.size,
                "upload_method": "sftp",
            }),
        };

        let message = format!(
            "SFTP upload: {} by {} ({} bytes)",
            event.path, event.username, event.size
        );
        self.metadata.record(&record, Some(&message)).await?;

        Ok(self.writer.store(&path, payload, object_id).await)
    }

    async fn cleanup(&self, object_id: &str, landed_path: &str, claim: ClaimedFile) -> Result<(), AppError> {
        match fs::remove_file(&claim.claimed).await {
            Ok(()) => {
                tracing::info!(object_id = %object_id, path = %landed_path, "Cleaned up uploaded file");
                self.log
                    .log(
                        object_id,
                        LogStatus::CleanedUp,
                        Some(&format!("Removed original file: {}", landed_path)),
                    )
                    .await
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(object_id = %object_id, path = %landed_path, "Uploaded file already gone");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(object_id = %object_id, path = %landed_path, error = %e, "Failed to clean up file");
                self.log
                    .log(object_id, LogStatus::CleanupFailed, Some(&e.to_string()))
                    .await
            }
        }
    }
}

/// A landed file renamed to `.<object_id>.processing` in its own directory.
#[derive(Debug)]
struct ClaimedFile {
    landed: PathBuf,
    claimed: PathBuf,
}

impl ClaimedFile {
    /// Check the landed file and move it aside.
    ///
    /// The path must resolve to a regular file strictly inside `upload_root`
    /// and be no larger than `max_bytes`. Nothing is moved when a check fails.
    async fn claim(
        landed: &Path,
        upload_root: &Path,
        object_id: &str,
        max_bytes: u64,
    ) -> Result<Self, AppError> {
        let root = fs::canonicalize(upload_root).await?;
        let landed = fs::canonicalize(landed).await?;
        if landed == root || !landed.starts_with(&root) {
            return Err(AppError::InvalidInput(format!(
                "{} is outside the upload root",
                landed.display()
            )));
        }

        let metadata = fs::metadata(&landed).await?;
        if !metadata.is_file() {
            return Err(AppError::InvalidInput(format!(
                "Not a regular file: {}",
                landed.display()
            )));
        }
        check_size(&landed, metadata.len(), max_bytes)?;

        let Some(dir) = landed.parent() else {
            return Err(AppError::InvalidInput(format!(
                "No parent directory: {}",
                landed.display()
            )));
        };
        let claimed = dir.join(format!(".{}.processing", object_id));
        fs::rename(&landed, &claimed).await?;
        tracing::debug!(landed = %landed.display(), claimed = %claimed.display(), "Claimed landed file");

        Ok(Self { landed, claimed })
    }

    async fn read(&self, max_bytes: u64) -> Result<Vec<u8>, AppError> {
        let data = fs::read(&self.claimed).await?;
        check_size(&self.landed, data.len() as u64, max_bytes)?;
        Ok(data)
    }

    /// Put the file back under its landed name. If a new upload already took
    /// that name, the claimed file is left where it is.
    async fn restore(self, object_id: &str) {
        match fs::hard_link(&self.claimed, &self.landed).await {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&self.claimed).await {
                    tracing::warn!(object_id = %object_id, claimed = %self.claimed.display(), error = %e, "Failed to drop claim after restore");
                }
            }
            Err(e) => {
                tracing::warn!(
                    object_id = %object_id,
                    landed = %self.landed.display(),
                    claimed = %self.claimed.display(),
                    error = %e,
                    "Could not restore landed file, keeping it under its claimed name"
                );
            }
        }
    }
}

fn check_size(path: &Path, len: u64, max_bytes: u64) -> Result<(), AppError> {
    if len > max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "{} is {} bytes (limit {})",
            path.display(),
            len,
            max_bytes
        )));
    }
    Ok(())
}

#[async_trait]
impl EnvelopeProcessor for SftpPipeline {
    fn name(&self) -> &'static str {
        "sftp"
    }

    async fn process(&self, payload: &[u8]) -> Result<(), AppError> {
        SftpPipeline::process(self, payload).await
    }
}
