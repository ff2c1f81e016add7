//! SFTP storage worker.
//!
//! Reads upload completion events from stdin, one per line, and moves the
//! landed files into the bronze layer.

use anyhow::{Context, Result};
use bronze_core::Config;
use bronze_infra::{init_telemetry, shutdown_telemetry};
use bronze_worker::app::{run_stdin_worker, WorkerKind};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry("bronze-sftp-worker", &config.environment, &config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;
    tracing::info!(upload_root = %config.sftp.upload_root.display(), "Starting SFTP storage worker");

    let result = run_stdin_worker(WorkerKind::Sftp, &config).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{:#}", e), "SFTP worker stopped");
    }

    shutdown_telemetry().await;
    result.map(|_| ())
}
