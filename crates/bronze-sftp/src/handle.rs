use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::notifier::{FileLanded, UploadNotifier};
use crate::vfs::{FileAttributes, VfsError, VfsResult};

/// An open file inside a session.
///
/// Closing a handle that was opened for writing announces the landed file once.
/// Dropping the handle closes it.
#[derive(Debug)]
pub struct FileHandle {
    file: Option<File>,
    path: PathBuf,
    writable: bool,
    username: String,
    notifier: Option<UploadNotifier>,
}

impl FileHandle {
    pub(crate) fn new(
        file: File,
        path: PathBuf,
        writable: bool,
        username: String,
        notifier: Option<UploadNotifier>,
    ) -> Self {
        Self {
            file: Some(file),
            path,
            writable,
            username,
            notifier,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn file(&mut self) -> VfsResult<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            VfsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "handle is closed",
            ))
        })
    }

    /// Read up to `len` bytes at `offset`. An empty buffer means end of file.
    pub fn read(&mut self, offset: u64, len: usize) -> VfsResult<Vec<u8>> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> VfsResult<()> {
        if !self.writable {
            return Err(VfsError::PermissionDenied(
                "Handle not opened for writing".to_string(),
            ));
        }
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    pub fn attributes(&mut self) -> VfsResult<FileAttributes> {
        let metadata = self.file()?.metadata()?;
        Ok(FileAttributes::from(&metadata))
    }

    /// Close the handle. Only the first call has any effect.
    pub fn close(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        if self.writable {
            if let Err(e) = file.sync_all() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to sync uploaded file");
            }
        }
        drop(file);

        if !self.writable {
            return;
        }

        let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        tracing::info!(
            path = %self.path.display(),
            username = %self.username,
            size = size,
            "File upload completed"
        );

        if let Some(notifier) = &self.notifier {
            notifier.notify(FileLanded::now(
                self.path.display().to_string(),
                size,
                self.username.clone(),
            ));
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.close();
    }
}
