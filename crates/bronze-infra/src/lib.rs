//! Bronze Infrastructure Library
//!
//! Shared infrastructure for the ingestion services:
//! - Telemetry initialization (tracing subscriber)
//! - Connect-with-retry for external collaborators

pub mod retry;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub use retry::{connect_with_retry, linear_backoff};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};
