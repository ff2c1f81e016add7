//! Connection pool and schema setup for the provenance database.

use anyhow::{bail, Context, Result};
use bronze_core::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Tables the pipeline writes to; checked after migrations run.
const REQUIRED_TABLES: [&str; 2] = ["ingestion.raw_ingestion", "ingestion.ingestion_log"];

/// Connect, apply the embedded migrations and confirm the ingestion schema exists.
pub async fn setup_database(config: &DatabaseConfig) -> Result<PgPool> {
    tracing::info!(
        max_connections = config.max_connections,
        timeout_seconds = config.timeout_seconds,
        "Connecting to provenance database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to apply ingestion migrations")?;

    for table in REQUIRED_TABLES {
        let present: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(&pool)
            .await
            .with_context(|| format!("Failed to check table {}", table))?;
        if !present {
            bail!("Required table {} is missing after migrations", table);
        }
    }

    tracing::info!("Provenance schema ready");
    Ok(pool)
}
