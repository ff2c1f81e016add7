//! In-memory object storage for testing

use async_trait::async_trait;
use bronze_storage::{Compression, Storage, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

type WriteHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Stores objects uncompressed under their logical path.
#[derive(Clone, Default)]
pub struct MockStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<Mutex<Vec<String>>>,
    fail_writes: bool,
    on_write: Option<WriteHook>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Run `hook` with the logical path at the start of every write.
    pub fn on_write(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_write = Some(Arc::new(hook));
        self
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Every successful write, in order, including rewrites of the same path.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn write(&self, path: &str, data: Vec<u8>) -> StorageResult<String> {
        if let Some(hook) = &self.on_write {
            hook(path);
        }
        if self.fail_writes {
            return Err(StorageError::UploadFailed("disk full".to_string()));
        }
        self.objects.lock().unwrap().insert(path.to_string(), data);
        self.writes.lock().unwrap().push(path.to_string());
        Ok(path.to_string())
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn copy_from_local(&self, local_path: &Path, path: &str) -> StorageResult<u64> {
        let data = tokio::fs::read(local_path).await?;
        let size = data.len() as u64;
        self.write(path, data).await?;
        Ok(size)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn compression(&self) -> Compression {
        Compression::None
    }
}
