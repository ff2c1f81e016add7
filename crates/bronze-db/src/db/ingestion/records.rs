use async_trait::async_trait;
use bronze_core::{AppError, Fingerprint, IngestionRecord, NewIngestionRecord, RecordOutcome};
use sqlx::{PgPool, Postgres};

use super::log::IngestionLogRepository;
use crate::db::transaction::TransactionGuard;

const UNIQUE_VIOLATION: &str = "23505";
const FINGERPRINT_CONSTRAINT: &str = "raw_ingestion_fingerprint_key";

/// Dedup & metadata store keyed by payload fingerprint.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert the provenance row for a first-seen fingerprint and append the
    /// matching `ingested` / `duplicate` log entry.
    ///
    /// A fingerprint that already exists is not an error.
    async fn record(
        &self,
        record: &NewIngestionRecord,
        message: Option<&str>,
    ) -> Result<RecordOutcome, AppError>;

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IngestionRecord>, AppError>;

    async fn count(&self) -> Result<i64, AppError>;
}

#[derive(Clone)]
pub struct IngestionRecordRepository {
    pool: PgPool,
}

impl IngestionRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(
        skip(self, record),
        fields(db.table = "ingestion.raw_ingestion", db.operation = "insert", object_id = %record.object_id)
    )]
    async fn insert_once(&self, record: &NewIngestionRecord) -> Result<RecordOutcome, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool, "raw_ingestion insert").await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO ingestion.raw_ingestion
                (object_id, ingestion_source, format, content_type, subtype,
                 data_version, storage_path, fingerprint, source_metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.object_id)
        .bind(record.origin.as_str())
        .bind(&record.format)
        .bind(&record.content_type)
        .bind(&record.subtype)
        .bind(record.version.as_deref())
        .bind(&record.storage_path)
        .bind(&record.fingerprint.as_bytes()[..])
        .bind(&record.source_metadata)
        .execute(tx.conn()?)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(RecordOutcome::New)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                    && db_err.constraint() == Some(FINGERPRINT_CONSTRAINT) =>
            {
                tx.rollback().await?;
                tracing::warn!(
                    object_id = %record.object_id,
                    fingerprint = %record.fingerprint,
                    "Duplicate fingerprint"
                );
                Ok(RecordOutcome::Duplicate)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e.into())
            }
        }
    }

    /// Separate transaction: the insert may have been rolled back.
    async fn append_outcome(
        &self,
        record: &NewIngestionRecord,
        outcome: RecordOutcome,
        message: Option<&str>,
    ) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool, "ingestion_log append").await?;
        IngestionLogRepository::log_tx(tx.conn()?, &record.object_id, outcome.log_status(), message)
            .await?;
        tx.commit().await
    }
}

#[async_trait]
impl MetadataStore for IngestionRecordRepository {
    async fn record(
        &self,
        record: &NewIngestionRecord,
        message: Option<&str>,
    ) -> Result<RecordOutcome, AppError> {
        let outcome = self.insert_once(record).await?;

        // The outcome is settled once the insert is committed or rolled back, so
        // a failed log append must not stop the bytes from being stored.
        if let Err(e) = self.append_outcome(record, outcome, message).await {
            tracing::error!(
                object_id = %record.object_id,
                status = %outcome.log_status(),
                error = %e,
                "Failed to append provenance outcome to ingestion log"
            );
        }

        Ok(outcome)
    }

    #[tracing::instrument(skip(self), fields(db.table = "ingestion.raw_ingestion", db.operation = "select"))]
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IngestionRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, IngestionRecord>(
            r#"
            SELECT object_id, ingestion_source, format, content_type, subtype,
                   data_version, storage_path, fingerprint, source_metadata, created_at
            FROM ingestion.raw_ingestion
            WHERE fingerprint = $1
            "#,
        )
        .bind(&fingerprint.as_bytes()[..])
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "ingestion.raw_ingestion", db.operation = "select"))]
    async fn count(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM ingestion.raw_ingestion")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
