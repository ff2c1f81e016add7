use crate::compression::{self, physical_key};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::{Compression, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    compression: Compression,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `compression` - Compression applied to every written object
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        compression: Compression,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            compression,
        })
    }

    async fn put_encoded(&self, key: &str, encoded: Vec<u8>, size: u64) -> StorageResult<()> {
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self
            .store
            .put(&location, PutPayload::from(Bytes::from(encoded)))
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 write failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 write successful"
        );

        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<String> {
        let key = physical_key(path, self.compression);
        let size = data.len() as u64;
        let encoded = compression::encode(data, self.compression)?;
        self.put_encoded(&key, encoded, size).await?;
        Ok(key)
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = physical_key(path, self.compression);
        let location = Path::from(key.clone());

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(path.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 read failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        compression::decode(bytes.to_vec(), self.compression)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let location = Path::from(physical_key(path, self.compression));
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = physical_key(path, self.compression);
        let location = Path::from(key.clone());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 delete failed"
                );
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn copy_from_local(&self, local_path: &std::path::Path, path: &str) -> StorageResult<u64> {
        let key = physical_key(path, self.compression);

        // Single put, same as the in-memory write path. Uploads are bounded by
        // the file-drop size limit.
        let data = tokio::fs::read(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(local_path.display().to_string())
            } else {
                StorageError::UploadFailed(format!(
                    "Failed to read {}: {}",
                    local_path.display(),
                    e
                ))
            }
        })?;

        let size = data.len() as u64;
        let compression = self.compression;
        let encoded = tokio::task::spawn_blocking(move || compression::encode(data, compression))
            .await
            .map_err(|e| StorageError::BackendError(format!("Encode task failed: {}", e)))??;

        self.put_encoded(&key, encoded, size).await?;
        Ok(size)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    fn compression(&self) -> Compression {
        self.compression
    }
}
