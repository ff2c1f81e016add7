//! Pipeline orchestrators
//!
//! Both front doors share one sequence: log `started`, fingerprint the payload,
//! derive the storage path, record provenance (the dedup outcome does not change
//! control flow), then write the bytes. Duplicates are rewritten to the same path.

pub mod api;
pub mod sftp;

pub use api::ApiPipeline;
pub use sftp::{SftpPipeline, SftpPipelineConfig};

use bronze_core::{AppError, LogStatus};
use bronze_db::IngestionLog;

/// Append a `failed` entry for an error that aborted processing, then hand the
/// error back. A log failure here is traced and the original error wins.
pub(crate) async fn fail_with(log: &dyn IngestionLog, object_id: &str, error: AppError) -> AppError {
    let message = error.to_string();
    if let Err(log_err) = log.log(object_id, LogStatus::Failed, Some(&message)).await {
        tracing::error!(
            object_id = %object_id,
            error = %log_err,
            "Failed to append failure entry to ingestion log"
        );
    }
    error
}
