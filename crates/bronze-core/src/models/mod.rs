pub mod envelope;
pub mod fingerprint;
pub mod ingestion;

pub use envelope::{ApiEnvelope, SftpUploadEvent};
pub use fingerprint::Fingerprint;
pub use ingestion::{
    IngestionLogEntry, IngestionRecord, LogStage, LogStatus, NewIngestionRecord, Origin,
    RecordOutcome,
};
