use async_trait::async_trait;
use bronze_core::{AppError, IngestionLogEntry, LogStage, LogStatus};
use sqlx::{PgConnection, PgPool, Postgres};
use std::collections::BTreeMap;

/// Append-only record of every stage an object passes through.
#[async_trait]
pub trait IngestionLog: Send + Sync {
    /// Append one entry. Entries are never updated.
    async fn log(
        &self,
        object_id: &str,
        status: LogStatus,
        message: Option<&str>,
    ) -> Result<(), AppError>;

    /// All entries for an object, oldest first.
    async fn history(&self, object_id: &str) -> Result<Vec<IngestionLogEntry>, AppError>;

    /// Latest entry per stage.
    async fn current_state(
        &self,
        object_id: &str,
    ) -> Result<BTreeMap<LogStage, IngestionLogEntry>, AppError> {
        let history = self.history(object_id).await?;
        Ok(reduce_latest_per_stage(&history))
    }
}

/// Reduce a log history to the most recent entry of each stage.
///
/// Entries are replayed in `(created_at, id)` order, so ties on `created_at`
/// are broken by the insertion id. A `failed` entry is placed on the stage that
/// was in progress when it was written.
pub fn reduce_latest_per_stage(entries: &[IngestionLogEntry]) -> BTreeMap<LogStage, IngestionLogEntry> {
    let mut ordered: Vec<&IngestionLogEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| (entry.created_at, entry.id));

    let mut latest = BTreeMap::new();
    let mut reached = None;
    for entry in ordered {
        let stage = entry.status.stage_after(reached);
        if entry.status != LogStatus::Failed {
            reached = Some(stage);
        }
        latest.insert(stage, entry.clone());
    }

    latest
}

#[derive(Clone)]
pub struct IngestionLogRepository {
    pool: PgPool,
}

impl IngestionLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an entry on a connection that is already inside a transaction.
    #[tracing::instrument(skip(conn), fields(db.table = "ingestion.ingestion_log", db.operation = "insert"))]
    pub async fn log_tx(
        conn: &mut PgConnection,
        object_id: &str,
        status: LogStatus,
        message: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO ingestion.ingestion_log (object_id, status, message) VALUES ($1, $2, $3)",
        )
        .bind(object_id)
        .bind(status.as_str())
        .bind(message)
        .execute(conn)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl IngestionLog for IngestionLogRepository {
    #[tracing::instrument(skip(self), fields(db.table = "ingestion.ingestion_log", db.operation = "insert"))]
    async fn log(
        &self,
        object_id: &str,
        status: LogStatus,
        message: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO ingestion.ingestion_log (object_id, status, message) VALUES ($1, $2, $3)",
        )
        .bind(object_id)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "ingestion.ingestion_log", db.operation = "select"))]
    async fn history(&self, object_id: &str) -> Result<Vec<IngestionLogEntry>, AppError> {
        let entries = sqlx::query_as::<Postgres, IngestionLogEntry>(
            r#"
            SELECT id, object_id, status, message, created_at
            FROM ingestion.ingestion_log
            WHERE object_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(object_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
