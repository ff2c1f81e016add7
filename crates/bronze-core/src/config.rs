//! Configuration module
//!
//! Settings are read from the environment (after loading an optional `.env`
//! file) with typed defaults, then validated as a whole.

use std::env;
use std::path::PathBuf;

use crate::storage_types::{Compression, StorageBackend};

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const TRANSPORT_MAX_RETRIES: u32 = 5;
const TRANSPORT_BASE_BACKOFF_MS: u64 = 1000;
const SFTP_PORT: u16 = 2222;
const SFTP_MAX_SESSIONS: usize = 64;
const SFTP_EVENT_BUFFER: usize = 1024;
const SFTP_MAX_FILE_MB: u64 = 1024;
const DEFAULT_SFTP_USERS: &str = "alice:secret:read+write";

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub compression: Compression,
    pub local_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub servers: Vec<String>,
    pub api_topic: String,
    pub api_group: String,
    pub sftp_topic: String,
    pub sftp_group: String,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    /// Pipe-separated user entries: `user:password:perm+perm|user2:password2`
    pub users: String,
    pub keys_dir: PathBuf,
    pub upload_root: PathBuf,
    pub max_sessions: usize,
    pub event_buffer: usize,
    pub max_file_bytes: u64,
}

/// Application configuration shared by the storage workers and the SFTP server.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub log_format: String,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub transport: TransportConfig,
    pub sftp: SftpConfig,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .or_else(|_| env::var("POSTGRES_DSN"))
                .map_err(|_| anyhow::anyhow!("DATABASE_URL or POSTGRES_DSN must be set"))?,
            max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
        };

        let backend = match env::var("STORAGE_BACKEND") {
            Ok(s) => s.parse()?,
            Err(_) => StorageBackend::Local,
        };
        let compression = match env::var("STORAGE_COMPRESSION") {
            Ok(s) => s.parse()?,
            Err(_) => Compression::default(),
        };

        let storage = StorageConfig {
            backend,
            compression,
            local_path: env::var("RAW_STORAGE_PATH").ok().filter(|s| !s.is_empty()),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
        };

        let transport = TransportConfig {
            servers: env_or("KAFKA_SERVERS", "localhost:9092")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            api_topic: env_or("KAFKA_BRONZE_API_TOPIC", "bronze.api.raw"),
            api_group: env_or("KAFKA_BRONZE_API_GROUP", "bronze-api-storage"),
            sftp_topic: env_or("KAFKA_BRONZE_SFTP_TOPIC", "bronze.sftp.raw"),
            sftp_group: env_or("KAFKA_BRONZE_SFTP_GROUP", "bronze-sftp-storage"),
            max_retries: env_parse("TRANSPORT_MAX_RETRIES", TRANSPORT_MAX_RETRIES),
            base_backoff_ms: env_parse("TRANSPORT_BASE_BACKOFF_MS", TRANSPORT_BASE_BACKOFF_MS),
        };

        let sftp = SftpConfig {
            host: env_or("SFTP_HOST", "0.0.0.0"),
            port: env_parse("SFTP_PORT", SFTP_PORT),
            users: env_or("SFTP_USERS", DEFAULT_SFTP_USERS),
            keys_dir: PathBuf::from(env_or("SFTP_KEYS_DIR", "/app/keys/users")),
            upload_root: PathBuf::from(env_or("SFTP_UPLOAD_ROOT", "/app/uploads")),
            max_sessions: env_parse("SFTP_MAX_SESSIONS", SFTP_MAX_SESSIONS),
            event_buffer: env_parse("SFTP_EVENT_BUFFER", SFTP_EVENT_BUFFER),
            max_file_bytes: env_parse("SFTP_MAX_FILE_MB", SFTP_MAX_FILE_MB) * 1024 * 1024,
        };

        let config = Config {
            environment,
            log_format: env_or("LOG_FORMAT", "text").to_lowercase(),
            database,
            storage,
            transport,
            sftp,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database.url.starts_with("postgresql://")
            && !self.database.url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.transport.max_retries == 0 {
            return Err(anyhow::anyhow!("TRANSPORT_MAX_RETRIES must be at least 1"));
        }

        if self.sftp.max_sessions == 0 || self.sftp.event_buffer == 0 {
            return Err(anyhow::anyhow!(
                "SFTP_MAX_SESSIONS and SFTP_EVENT_BUFFER must be greater than zero"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "RAW_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
