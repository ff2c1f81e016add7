//! Provenance store and ingestion log against a real Postgres.

mod helpers;

use bronze_core::{AppError, Fingerprint, LogStage, LogStatus, Origin, RecordOutcome};
use bronze_db::{setup_database, IngestionLog, IngestionLogRepository, IngestionRecordRepository, MetadataStore};
use helpers::{api_record, setup_test_db};

#[tokio::test]
async fn test_first_fingerprint_is_recorded_and_logged() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let records = IngestionRecordRepository::new(db.pool.clone());
    let log = IngestionLogRepository::new(db.pool.clone());

    let record = api_record("obj-1", b"hello");
    let outcome = records.record(&record, Some("first")).await.unwrap();

    assert_eq!(outcome, RecordOutcome::New);
    assert_eq!(records.count().await.unwrap(), 1);

    let stored = records
        .find_by_fingerprint(&Fingerprint::compute(b"hello"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.object_id, "obj-1");
    assert_eq!(stored.origin, Origin::Api);
    assert_eq!(stored.version, None);
    assert_eq!(stored.storage_path, record.storage_path);
    assert_eq!(stored.source_metadata["ingestion_method"], "api");

    let history = log.history("obj-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LogStatus::Ingested);
    assert_eq!(history[0].message.as_deref(), Some("first"));
    // The log entry is written in its own transaction after the insert commits.
    assert!(history[0].created_at >= stored.created_at);
}

#[tokio::test]
async fn test_duplicate_fingerprint_keeps_one_row_and_logs_duplicate() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let records = IngestionRecordRepository::new(db.pool.clone());
    let log = IngestionLogRepository::new(db.pool.clone());

    records.record(&api_record("obj-1", b"same"), None).await.unwrap();
    let outcome = records
        .record(&api_record("obj-2", b"same"), Some("again"))
        .await
        .unwrap();

    assert_eq!(outcome, RecordOutcome::Duplicate);
    assert_eq!(records.count().await.unwrap(), 1);

    let owner = records
        .find_by_fingerprint(&Fingerprint::compute(b"same"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner.object_id, "obj-1");

    let history = log.history("obj-2").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LogStatus::Duplicate);
    assert_eq!(history[0].message.as_deref(), Some("again"));
}

#[tokio::test]
async fn test_object_id_clash_is_a_database_error() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let records = IngestionRecordRepository::new(db.pool.clone());
    let log = IngestionLogRepository::new(db.pool.clone());

    records.record(&api_record("obj-1", b"one"), None).await.unwrap();
    let result = records.record(&api_record("obj-1", b"two"), None).await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(records.count().await.unwrap(), 1);
    assert!(records
        .find_by_fingerprint(&Fingerprint::compute(b"two"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(log.history("obj-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_outcome_survives_log_append_failure() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    sqlx::query(
        "ALTER TABLE ingestion.ingestion_log \
         ADD CONSTRAINT reject_ingested CHECK (status <> 'ingested') NOT VALID",
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let records = IngestionRecordRepository::new(db.pool.clone());
    let log = IngestionLogRepository::new(db.pool.clone());

    let outcome = records.record(&api_record("obj-1", b"hello"), None).await.unwrap();

    assert_eq!(outcome, RecordOutcome::New);
    assert_eq!(records.count().await.unwrap(), 1);
    assert!(log.history("obj-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_current_state_reduces_real_history() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let records = IngestionRecordRepository::new(db.pool.clone());
    let log = IngestionLogRepository::new(db.pool.clone());

    log.log("obj-1", LogStatus::Started, None).await.unwrap();
    records.record(&api_record("obj-1", b"hello"), None).await.unwrap();
    log.log("obj-1", LogStatus::Failed, Some("disk full")).await.unwrap();
    log.log("obj-1", LogStatus::StorageFailed, Some("kept")).await.unwrap();

    let history = log.history("obj-1").await.unwrap();
    assert_eq!(
        history.iter().map(|e| e.status).collect::<Vec<_>>(),
        vec![
            LogStatus::Started,
            LogStatus::Ingested,
            LogStatus::Failed,
            LogStatus::StorageFailed
        ]
    );

    let state = log.current_state("obj-1").await.unwrap();
    assert_eq!(state.len(), 3);
    assert_eq!(state[&LogStage::Intake].status, LogStatus::Started);
    assert_eq!(state[&LogStage::Metadata].status, LogStatus::Ingested);
    assert_eq!(state[&LogStage::Storage].status, LogStatus::StorageFailed);
}

#[tokio::test]
async fn test_early_failure_lands_on_intake() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let log = IngestionLogRepository::new(db.pool.clone());

    log.log("obj-9", LogStatus::Started, None).await.unwrap();
    log.log("obj-9", LogStatus::Failed, Some("Base64 decoding error")).await.unwrap();

    let state = log.current_state("obj-9").await.unwrap();
    assert_eq!(state[&LogStage::Intake].status, LogStatus::Failed);
    assert!(!state.contains_key(&LogStage::Storage));
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let again = setup_database(&db.config).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingestion.ingestion_log")
        .fetch_one(&again)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
