//! File-drop ingestion service.
//!
//! Watches the upload root (written by an SFTP daemon that owns it) and runs the
//! SFTP storage worker in the same process, connected by the in-process channel
//! transport. Ctrl-C stops the watcher and drains queued uploads before exit.

use anyhow::{Context, Result};
use bronze_core::{AppError, Config};
use bronze_infra::{init_telemetry, shutdown_telemetry};
use bronze_sftp::{spawn_publisher, watch_uploads, UploadNotifier};
use bronze_worker::app::{run_worker, Services, WorkerKind};
use bronze_worker::ChannelTransport;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry("bronze-sftp", &config.environment, &config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let result = run(&config).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{:#}", e), "bronze-sftp stopped");
    }

    shutdown_telemetry().await;
    result
}

async fn run(config: &Config) -> Result<()> {
    let services = Services::connect(config).await?;

    std::fs::create_dir_all(&config.sftp.upload_root).with_context(|| {
        format!(
            "Failed to create upload root {}",
            config.sftp.upload_root.display()
        )
    })?;

    let (publisher, consumer) = ChannelTransport::bounded(config.sftp.event_buffer);
    let (notifier, rx) = UploadNotifier::channel(config.sftp.event_buffer);
    let forwarder = spawn_publisher(
        rx,
        Arc::new(publisher),
        config.transport.sftp_topic.clone(),
    );
    let watcher = watch_uploads(&config.sftp.upload_root, notifier)
        .context("Failed to watch upload root")?;

    let mut consumer = Some(consumer);
    let worker = run_worker(WorkerKind::Sftp, config, &services, move || {
        let consumer = consumer.take();
        async move {
            consumer.ok_or_else(|| AppError::Transport("In-process consumer already taken".to_string()))
        }
    });
    tokio::pin!(worker);

    let stats = tokio::select! {
        result = &mut worker => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested, draining queued uploads");
            // Dropping the watcher closes the notifier, which ends the forwarder
            // and then the consumer.
            drop(watcher);
            forwarder.await.context("Upload event forwarder panicked")?;
            worker.await?
        }
    };

    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        "SFTP storage worker finished"
    );
    Ok(())
}
