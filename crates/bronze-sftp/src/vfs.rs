//! Sandboxed virtual filesystem.
//!
//! Every client path is interpreted relative to the session root
//! `<upload_root>/<username>`. Paths are normalized lexically and then checked
//! against the canonical root, following symlinks, before any filesystem call
//! touches them. Permissions are checked before paths are resolved.

use std::collections::HashSet;
use std::fs::{self, Metadata, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

use crate::handle::FileHandle;
use crate::notifier::UploadNotifier;
use crate::users::Permission;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No such file: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(err.to_string()),
            _ => VfsError::Io(err),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Attributes reported for files and directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Unix mode bits, including the file type.
    pub permissions: u32,
    /// Seconds since the Unix epoch.
    pub mtime: u64,
}

impl From<&Metadata> for FileAttributes {
    fn from(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::MetadataExt;
            metadata.mode()
        };
        #[cfg(not(unix))]
        let permissions = if metadata.permissions().readonly() { 0o444 } else { 0o644 };

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
            permissions,
            mtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub filename: String,
    pub attributes: FileAttributes,
}

/// How a file is opened. Any flag other than `read` needs the `write` permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// Create or truncate, the usual flags for an upload.
    pub fn upload() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Self::default()
        }
    }

    pub fn is_write(&self) -> bool {
        self.write || self.append || self.create || self.truncate || self.exclusive
    }

    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read || !self.is_write())
            .write(self.is_write() && !self.append)
            .append(self.append);
        if self.exclusive {
            options.create_new(true);
        } else {
            options.create(self.create);
        }
        if self.truncate {
            options.truncate(true);
        }
        options
    }
}

/// One user's view of the upload area. Owned by a single connection.
#[derive(Debug)]
pub struct Session {
    username: String,
    root: PathBuf,
    permissions: HashSet<Permission>,
    notifier: Option<UploadNotifier>,
}

impl Session {
    /// Create `<upload_root>/<username>` if needed and pin the session to it.
    pub fn open(
        upload_root: &Path,
        username: &str,
        permissions: HashSet<Permission>,
        notifier: Option<UploadNotifier>,
    ) -> VfsResult<Self> {
        if username.is_empty()
            || username == "."
            || username == ".."
            || username.contains(['/', '\\'])
        {
            return Err(VfsError::PermissionDenied(format!(
                "Invalid username: {}",
                username
            )));
        }

        let root = upload_root.join(username);
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;

        tracing::info!(username = %username, root = %root.display(), "SFTP session opened");

        Ok(Self {
            username: username.to_string(),
            root,
            permissions,
            notifier,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    fn require(&self, permission: Permission, operation: &str) -> VfsResult<()> {
        if self.has_permission(permission) {
            return Ok(());
        }
        tracing::warn!(
            username = %self.username,
            operation = operation,
            permission = %permission,
            "Operation denied"
        );
        Err(VfsError::PermissionDenied(format!(
            "{} requires {} permission",
            operation, permission
        )))
    }

    /// Map a client path to a real path inside the session root.
    pub fn resolve(&self, client_path: &str) -> VfsResult<PathBuf> {
        let denied = || VfsError::PermissionDenied(format!("Access denied: {}", client_path));

        let mut parts = Vec::new();
        for component in Path::new(client_path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        tracing::warn!(username = %self.username, path = %client_path, "Path escapes session root");
                        return Err(denied());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(denied()),
            }
        }

        let candidate = parts
            .into_iter()
            .fold(self.root.clone(), |path, part| path.join(part));

        if !self.is_contained(&candidate) {
            tracing::warn!(username = %self.username, path = %client_path, "Path resolves outside session root");
            return Err(denied());
        }

        Ok(candidate)
    }

    /// The deepest existing ancestor of `candidate`, symlinks followed, must stay
    /// under the root. A dangling symlink cannot be resolved and is refused.
    fn is_contained(&self, candidate: &Path) -> bool {
        let mut ancestor = candidate;
        while fs::symlink_metadata(ancestor).is_err() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => return false,
            }
        }

        match ancestor.canonicalize() {
            Ok(real) => real.starts_with(&self.root),
            Err(_) => false,
        }
    }

    /// Client-visible absolute form of a path.
    pub fn realpath(&self, client_path: &str) -> VfsResult<String> {
        let real = self.resolve(client_path)?;
        let relative = real
            .strip_prefix(&self.root)
            .map_err(|_| VfsError::PermissionDenied(client_path.to_string()))?;

        let mut virtual_path = String::from("/");
        virtual_path.push_str(&relative.to_string_lossy());
        Ok(virtual_path)
    }

    pub fn list(&self, client_path: &str) -> VfsResult<Vec<DirEntry>> {
        self.require(Permission::Read, "list")?;
        let dir = self.resolve(client_path)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.path().symlink_metadata()?;
            entries.push(DirEntry {
                filename: entry.file_name().to_string_lossy().into_owned(),
                attributes: FileAttributes::from(&metadata),
            });
        }
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));

        tracing::debug!(username = %self.username, path = %client_path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    pub fn stat(&self, client_path: &str) -> VfsResult<FileAttributes> {
        self.require(Permission::Read, "stat")?;
        let path = self.resolve(client_path)?;
        Ok(FileAttributes::from(&fs::metadata(path)?))
    }

    pub fn lstat(&self, client_path: &str) -> VfsResult<FileAttributes> {
        self.require(Permission::Read, "lstat")?;
        let path = self.resolve(client_path)?;
        Ok(FileAttributes::from(&fs::symlink_metadata(path)?))
    }

    pub fn open_file(&self, client_path: &str, flags: OpenFlags) -> VfsResult<FileHandle> {
        if flags.is_write() {
            self.require(Permission::Write, "open for write")?;
        } else {
            self.require(Permission::Read, "open for read")?;
        }
        let path = self.resolve(client_path)?;
        let file = flags.options().open(&path)?;

        tracing::info!(
            username = %self.username,
            path = %client_path,
            write = flags.is_write(),
            "Opened file"
        );

        Ok(FileHandle::new(
            file,
            path,
            flags.is_write(),
            self.username.clone(),
            self.notifier.clone(),
        ))
    }

    pub fn remove(&self, client_path: &str) -> VfsResult<()> {
        self.require(Permission::Delete, "remove")?;
        let path = self.resolve(client_path)?;
        fs::remove_file(path)?;
        tracing::info!(username = %self.username, path = %client_path, "Removed file");
        Ok(())
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        self.require(Permission::Write, "rename")?;
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        fs::rename(from, to)?;
        tracing::info!(username = %self.username, from = %old_path, to = %new_path, "Renamed file");
        Ok(())
    }

    pub fn mkdir(&self, client_path: &str) -> VfsResult<()> {
        self.require(Permission::Write, "mkdir")?;
        let path = self.resolve(client_path)?;
        fs::create_dir_all(path)?;
        tracing::info!(username = %self.username, path = %client_path, "Created directory");
        Ok(())
    }

    pub fn rmdir(&self, client_path: &str) -> VfsResult<()> {
        self.require(Permission::Delete, "rmdir")?;
        let path = self.resolve(client_path)?;
        if path == self.root {
            return Err(VfsError::PermissionDenied(
                "Cannot remove session root".to_string(),
            ));
        }
        fs::remove_dir(path)?;
        tracing::info!(username = %self.username, path = %client_path, "Removed directory");
        Ok(())
    }
}
