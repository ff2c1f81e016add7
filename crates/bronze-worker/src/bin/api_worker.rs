//! API storage worker.
//!
//! Reads request envelopes from stdin, one JSON document per line, and stores
//! them in the bronze layer. Exits when stdin closes.

use anyhow::{Context, Result};
use bronze_core::Config;
use bronze_infra::{init_telemetry, shutdown_telemetry};
use bronze_worker::app::{run_stdin_worker, WorkerKind};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry("bronze-api-worker", &config.environment, &config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let result = run_stdin_worker(WorkerKind::Api, &config).await;
    match &result {
        Ok(stats) => tracing::info!(
            processed = stats.processed,
            failed = stats.failed,
            "API worker finished"
        ),
        Err(e) => tracing::error!(error = %format!("{:#}", e), "API worker stopped"),
    }

    shutdown_telemetry().await;
    result.map(|_| ())
}
