use crate::compression::{self, physical_key};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::{Compression, StorageBackend};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    compression: Compression,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for raw objects (e.g., "/data/raw")
    /// * `compression` - Compression applied to every written object
    pub async fn new(base_path: impl Into<PathBuf>, compression: Compression) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            compression,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a physical key to a filesystem path, refusing keys that would
    /// escape the base directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.split('/').any(|s| s == "..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid segments: {}",
                key
            )));
        }

        let path = self.base_path.join(key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        // The object itself may not exist yet; check the deepest existing ancestor.
        let mut ancestor = path.as_path();
        loop {
            if let Ok(canonical) = ancestor.canonicalize() {
                if canonical.strip_prefix(&base_canonical).is_err() {
                    return Err(StorageError::InvalidKey(
                        "Storage key resolves outside storage directory".to_string(),
                    ));
                }
                break;
            }
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Fill a uniquely named staging file next to `target`, sync it, then rename it
/// over `target`. The staging file is removed when any step fails.
fn persist_blocking<F>(target: &Path, fill: F) -> std::io::Result<u64>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<u64>,
{
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(".partial")
        .tempfile_in(dir)?;

    let written = fill(staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(written)
}

/// Copy `src` into `dst`, gzip-encoding on the way when requested.
fn copy_file_blocking(src: &Path, dst: &mut std::fs::File, compression: Compression) -> std::io::Result<u64> {
    let mut reader = std::fs::File::open(src)?;

    match compression {
        Compression::None => {
            let mut writer = std::io::BufWriter::new(dst);
            let copied = std::io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            Ok(copied)
        }
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(dst, flate2::Compression::default());
            let copied = std::io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?;
            Ok(copied)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<String> {
        let key = physical_key(path, self.compression);
        let target = self.key_to_path(&key)?;
        let size = data.len();

        self.ensure_parent_dir(&target).await?;

        let start = std::time::Instant::now();
        let encoded = compression::encode(data, self.compression)?;

        let stored_bytes = encoded.len();
        let dst = target.clone();
        tokio::task::spawn_blocking(move || {
            persist_blocking(&dst, |file| {
                file.write_all(&encoded)?;
                Ok(encoded.len() as u64)
            })
        })
        .await
        .map_err(|e| StorageError::BackendError(format!("Write task failed: {}", e)))?
        .map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", target.display(), e))
        })?;

        tracing::info!(
            path = %target.display(),
            key = %key,
            size_bytes = size,
            stored_bytes = stored_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(key)
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = physical_key(path, self.compression);
        let target = self.key_to_path(&key)?;

        if !fs::try_exists(&target).await.unwrap_or(false) {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let data = fs::read(&target).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", target.display(), e))
        })?;

        compression::decode(data, self.compression)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let target = self.key_to_path(&physical_key(path, self.compression))?;
        Ok(fs::try_exists(&target).await.unwrap_or(false))
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = physical_key(path, self.compression);
        let target = self.key_to_path(&key)?;

        if !fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&target).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", target.display(), e))
        })?;

        tracing::info!(path = %target.display(), key = %key, "Local storage delete successful");

        Ok(())
    }

    async fn copy_from_local(&self, local_path: &Path, path: &str) -> StorageResult<u64> {
        let key = physical_key(path, self.compression);
        let target = self.key_to_path(&key)?;

        if !fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(local_path.display().to_string()));
        }

        self.ensure_parent_dir(&target).await?;

        let start = std::time::Instant::now();
        let src = local_path.to_path_buf();
        let dst = target.clone();
        let compression = self.compression;

        let copied = tokio::task::spawn_blocking(move || {
            persist_blocking(&dst, |file| copy_file_blocking(&src, file, compression))
        })
        .await
        .map_err(|e| StorageError::BackendError(format!("Copy task failed: {}", e)))?
        .map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} into storage: {}",
                local_path.display(),
                e
            ))
        })?;

        tracing::info!(
            source = %local_path.display(),
            path = %target.display(),
            key = %key,
            size_bytes = copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage copy successful"
        );

        Ok(copied)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn compression(&self) -> Compression {
        self.compression
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_storage_write_read_gzip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::Gzip).await.unwrap();

        let key = storage
            .write("bronze/fhir/json/patient/abc.json", b"{\"a\":1}".to_vec())
            .await
            .unwrap();

        assert_eq!(key, "bronze/fhir/json/patient/abc.json.gz");
        assert!(dir.path().join(&key).exists());

        let raw = std::fs::read(dir.path().join(&key)).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let data = storage.read("bronze/fhir/json/patient/abc.json").await.unwrap();
        assert_eq!(data, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_local_storage_write_uncompressed() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::None).await.unwrap();

        let key = storage.write("bronze/x/y.bin", b"raw".to_vec()).await.unwrap();
        assert_eq!(key, "bronze/x/y.bin");
        assert_eq!(std::fs::read(dir.path().join(&key)).unwrap(), b"raw");
    }

    #[tokio::test]
    async fn test_write_replaces_existing_object() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::Gzip).await.unwrap();

        storage.write("bronze/a.json", b"one".to_vec()).await.unwrap();
        storage.write("bronze/a.json", b"two".to_vec()).await.unwrap();

        assert_eq!(storage.read("bronze/a.json").await.unwrap(), b"two");
    }

    fn staging_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".partial"))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_same_key() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::Gzip).await.unwrap();

        let writes = (0..8u8).map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.write("bronze/same.json", vec![i; 4096]).await })
        });
        for handle in writes.collect::<Vec<_>>() {
            handle.await.unwrap().unwrap();
        }

        let data = storage.read("bronze/same.json").await.unwrap();
        assert_eq!(data.len(), 4096);
        assert!(data.iter().all(|b| *b == data[0]));
        assert!(staging_files(&dir.path().join("bronze")).is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::None).await.unwrap();
        std::fs::create_dir_all(dir.path().join("bronze/taken.json")).unwrap();

        let result = storage.write("bronze/taken.json", b"x".to_vec()).await;

        assert!(matches!(result, Err(StorageError::UploadFailed(_))));
        assert!(staging_files(&dir.path().join("bronze")).is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::None).await.unwrap();

        let result = storage.read("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("bronze/../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_local_storage_delete_nonexistent() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::Gzip).await.unwrap();

        assert!(storage.delete("nonexistent/file.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_local_storage_exists() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::Gzip).await.unwrap();

        storage.write("bronze/exists.txt", b"test".to_vec()).await.unwrap();

        assert!(storage.exists("bronze/exists.txt").await.unwrap());
        assert!(!storage.exists("bronze/missing.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Compression::None).await.unwrap();

        let result = storage.read("bronze/nope.bin").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_from_local_streams_and_compresses() {
        let upload_dir = tempdir().unwrap();
        let store_dir = tempdir().unwrap();
        let storage = LocalStorage::new(store_dir.path(), Compression::Gzip).await.unwrap();

        let src = upload_dir.path().join("labs.csv");
        let content = b"id,value\n1,42\n".repeat(1000);
        std::fs::write(&src, &content).unwrap();

        let copied = storage.copy_from_local(&src, "bronze/sftp/alice/abc.csv").await.unwrap();

        assert_eq!(copied, content.len() as u64);
        assert!(src.exists());
        assert!(store_dir.path().join("bronze/sftp/alice/abc.csv.gz").exists());
        assert!(staging_files(&store_dir.path().join("bronze/sftp/alice")).is_empty());
        assert_eq!(storage.read("bronze/sftp/alice/abc.csv").await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_copy_from_local_missing_source() {
        let store_dir = tempdir().unwrap();
        let storage = LocalStorage::new(store_dir.path(), Compression::None).await.unwrap();

        let result = storage
            .copy_from_local(Path::new("/definitely/not/here.bin"), "bronze/x.bin")
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
