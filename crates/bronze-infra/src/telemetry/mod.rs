//! Tracing initialization
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` (from `RUST_LOG`)
//! and either a human-readable or a JSON fmt layer.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry};
