pub mod log;
pub mod records;

pub use log::{reduce_latest_per_stage, IngestionLog, IngestionLogRepository};
pub use records::{IngestionRecordRepository, MetadataStore};
