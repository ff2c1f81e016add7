//! Service bootstrap
//!
//! Builds the shared services from [`Config`] and runs a storage worker. The
//! broker client is supplied by the caller as a connect function; it is retried
//! with linear backoff and a final failure ends the process. The bundled
//! binaries read messages line by line from stdin.

use anyhow::{Context, Result};
use bronze_core::Config;
use bronze_db::{setup_database, IngestionLog, IngestionLogRepository, IngestionRecordRepository, MetadataStore};
use bronze_infra::connect_with_retry;
use bronze_storage::{create_storage, Storage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::{ApiPipeline, SftpPipeline, SftpPipelineConfig};
use crate::runner::{run_consumer, ConsumerStats, EnvelopeProcessor};
use crate::transport::{EnvelopeConsumer, LineConsumer};
use crate::writer::StorageWriter;

/// Shared services used by both storage workers.
#[derive(Clone)]
pub struct Services {
    pub metadata: Arc<dyn MetadataStore>,
    pub log: Arc<dyn IngestionLog>,
    pub storage: Arc<dyn Storage>,
}

impl Services {
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = connect_with_retry(
            "postgres",
            config.transport.max_retries,
            Duration::from_millis(config.transport.base_backoff_ms),
            || setup_database(&config.database),
        )
        .await
        .context("Database unavailable")?;

        let storage = create_storage(&config.storage)
            .await
            .context("Failed to initialize storage backend")?;

        tracing::info!(
            backend = %storage.backend_type(),
            compression = %storage.compression(),
            "Storage backend ready"
        );

        Ok(Self {
            metadata: Arc::new(IngestionRecordRepository::new(pool.clone())),
            log: Arc::new(IngestionLogRepository::new(pool)),
            storage,
        })
    }

    pub fn writer(&self) -> StorageWriter {
        StorageWriter::new(self.storage.clone(), self.log.clone())
    }

    pub fn api_pipeline(&self) -> ApiPipeline {
        ApiPipeline::new(self.metadata.clone(), self.log.clone(), self.writer())
    }

    pub fn sftp_pipeline(&self, config: &Config) -> SftpPipeline {
        SftpPipeline::new(
            self.metadata.clone(),
            self.log.clone(),
            self.writer(),
            SftpPipelineConfig {
                upload_root: config.sftp.upload_root.clone(),
                max_file_bytes: config.sftp.max_file_bytes,
            },
        )
    }
}

/// Which front door a worker consumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Api,
    Sftp,
}

impl WorkerKind {
    /// (topic, consumer group) for this worker.
    pub fn subscription(self, config: &Config) -> (&str, &str) {
        match self {
            WorkerKind::Api => (&config.transport.api_topic, &config.transport.api_group),
            WorkerKind::Sftp => (&config.transport.sftp_topic, &config.transport.sftp_group),
        }
    }
}

/// Connect the consumer, then process messages until it closes.
pub async fn run_worker<C, F, Fut>(
    kind: WorkerKind,
    config: &Config,
    services: &Services,
    connect: F,
) -> Result<ConsumerStats>
where
    C: EnvelopeConsumer,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<C, bronze_core::AppError>>,
{
    let (topic, group) = kind.subscription(config);
    tracing::info!(topic = %topic, group = %group, servers = ?config.transport.servers, "Connecting consumer");

    let mut consumer = connect_with_retry(
        "transport",
        config.transport.max_retries,
        Duration::from_millis(config.transport.base_backoff_ms),
        connect,
    )
    .await
    .with_context(|| format!("Could not connect consumer for topic {}", topic))?;

    let processor: Box<dyn EnvelopeProcessor> = match kind {
        WorkerKind::Api => Box::new(services.api_pipeline()),
        WorkerKind::Sftp => Box::new(services.sftp_pipeline(config)),
    };

    let stats = run_consumer(&mut consumer, processor.as_ref()).await?;
    Ok(stats)
}

/// Connect the shared services and consume messages from stdin until it closes.
pub async fn run_stdin_worker(kind: WorkerKind, config: &Config) -> Result<ConsumerStats> {
    let services = Services::connect(config).await?;
    let (topic, _) = kind.subscription(config);
    let topic = topic.to_string();

    run_worker(kind, config, &services, || {
        let consumer = LineConsumer::stdin(topic.clone());
        async move { Ok::<_, bronze_core::AppError>(consumer) }
    })
    .await
}
