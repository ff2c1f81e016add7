//! Protocol-neutral request dispatch for one SFTP session.
//!
//! The wire codec decodes packets into [`SftpRequest`] and encodes the returned
//! [`SftpResponse`]. Open files and directory listings live in a handle table
//! owned by the dispatcher; dropping the dispatcher closes every handle.

use std::collections::HashMap;

use crate::handle::FileHandle;
use crate::vfs::{DirEntry, FileAttributes, OpenFlags, Session, VfsError};

/// Largest read served in one response.
pub const MAX_READ_LEN: u32 = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SftpRequest {
    RealPath { path: String },
    Stat { path: String },
    LStat { path: String },
    OpenDir { path: String },
    ReadDir { handle: String },
    Open { path: String, flags: OpenFlags },
    Read { handle: String, offset: u64, len: u32 },
    Write { handle: String, offset: u64, data: Vec<u8> },
    FStat { handle: String },
    Close { handle: String },
    Remove { path: String },
    Rename { old_path: String, new_path: String },
    Mkdir { path: String },
    Rmdir { path: String },
}

/// SFTP v3 status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SftpStatus {
    Ok,
    Eof,
    NoSuchFile,
    PermissionDenied,
    Failure,
}

impl SftpStatus {
    pub fn code(&self) -> u32 {
        match self {
            SftpStatus::Ok => 0,
            SftpStatus::Eof => 1,
            SftpStatus::NoSuchFile => 2,
            SftpStatus::PermissionDenied => 3,
            SftpStatus::Failure => 4,
        }
    }
}

impl From<&VfsError> for SftpStatus {
    fn from(err: &VfsError) -> Self {
        match err {
            VfsError::PermissionDenied(_) => SftpStatus::PermissionDenied,
            VfsError::NotFound(_) => SftpStatus::NoSuchFile,
            VfsError::Io(_) => SftpStatus::Failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SftpResponse {
    Status { status: SftpStatus, message: String },
    Handle(String),
    Data(Vec<u8>),
    Attrs(FileAttributes),
    Name(Vec<DirEntry>),
}

impl SftpResponse {
    pub fn ok() -> Self {
        Self::status(SftpStatus::Ok, "")
    }

    pub fn status(status: SftpStatus, message: impl Into<String>) -> Self {
        SftpResponse::Status {
            status,
            message: message.into(),
        }
    }

    fn error(err: VfsError) -> Self {
        Self::status(SftpStatus::from(&err), err.to_string())
    }

    fn invalid_handle(handle: &str) -> Self {
        Self::status(SftpStatus::Failure, format!("Invalid handle: {}", handle))
    }

    pub fn status_code(&self) -> Option<SftpStatus> {
        match self {
            SftpResponse::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

enum OpenHandle {
    File(FileHandle),
    /// Remaining listing; taken by the first readdir.
    Dir(Option<Vec<DirEntry>>),
}

pub struct SftpDispatcher {
    session: Session,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpDispatcher {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn insert(&mut self, handle: OpenHandle) -> String {
        let id = self.next_handle.to_string();
        self.next_handle += 1;
        self.handles.insert(id.clone(), handle);
        id
    }

    pub fn handle(&mut self, request: SftpRequest) -> SftpResponse {
        tracing::debug!(
            username = %self.session.username(),
            op = request_name(&request),
            "SFTP request"
        );

        match request {
            SftpRequest::RealPath { path } => match self.session.realpath(&path) {
                Ok(real) => SftpResponse::Name(vec![DirEntry {
                    filename: real,
                    attributes: FileAttributes {
                        size: 0,
                        is_dir: false,
                        is_symlink: false,
                        permissions: 0,
                        mtime: 0,
                    },
                }]),
                Err(e) => SftpResponse::error(e),
            },
            SftpRequest::Stat { path } => self
                .session
                .stat(&path)
                .map_or_else(SftpResponse::error, SftpResponse::Attrs),
            SftpRequest::LStat { path } => self
                .session
                .lstat(&path)
                .map_or_else(SftpResponse::error, SftpResponse::Attrs),
            SftpRequest::OpenDir { path } => match self.session.list(&path) {
                Ok(entries) => SftpResponse::Handle(self.insert(OpenHandle::Dir(Some(entries)))),
                Err(e) => SftpResponse::error(e),
            },
            SftpRequest::ReadDir { handle } => match self.handles.get_mut(&handle) {
                Some(OpenHandle::Dir(listing)) => match listing.take() {
                    Some(entries) if !entries.is_empty() => SftpResponse::Name(entries),
                    _ => SftpResponse::status(SftpStatus::Eof, ""),
                },
                _ => SftpResponse::invalid_handle(&handle),
            },
            SftpRequest::Open { path, flags } => match self.session.open_file(&path, flags) {
                Ok(file) => SftpResponse::Handle(self.insert(OpenHandle::File(file))),
                Err(e) => SftpResponse::error(e),
            },
            SftpRequest::Read { handle, offset, len } => match self.handles.get_mut(&handle) {
                Some(OpenHandle::File(file)) => {
                    match file.read(offset, len.min(MAX_READ_LEN) as usize) {
                        Ok(data) if data.is_empty() => SftpResponse::status(SftpStatus::Eof, ""),
                        Ok(data) => SftpResponse::Data(data),
                        Err(e) => SftpResponse::error(e),
                    }
                }
                _ => SftpResponse::invalid_handle(&handle),
            },
            SftpRequest::Write { handle, offset, data } => match self.handles.get_mut(&handle) {
                Some(OpenHandle::File(file)) => file
                    .write(offset, &data)
                    .map_or_else(SftpResponse::error, |_| SftpResponse::ok()),
                _ => SftpResponse::invalid_handle(&handle),
            },
            SftpRequest::FStat { handle } => match self.handles.get_mut(&handle) {
                Some(OpenHandle::File(file)) => file
                    .attributes()
                    .map_or_else(SftpResponse::error, SftpResponse::Attrs),
                _ => SftpResponse::invalid_handle(&handle),
            },
            SftpRequest::Close { handle } => match self.handles.remove(&handle) {
                Some(OpenHandle::File(mut file)) => {
                    file.close();
                    SftpResponse::ok()
                }
                Some(OpenHandle::Dir(_)) => SftpResponse::ok(),
                None => SftpResponse::invalid_handle(&handle),
            },
            SftpRequest::Remove { path } => self
                .session
                .remove(&path)
                .map_or_else(SftpResponse::error, |_| SftpResponse::ok()),
            SftpRequest::Rename { old_path, new_path } => self
                .session
                .rename(&old_path, &new_path)
                .map_or_else(SftpResponse::error, |_| SftpResponse::ok()),
            SftpRequest::Mkdir { path } => self
                .session
                .mkdir(&path)
                .map_or_else(SftpResponse::error, |_| SftpResponse::ok()),
            SftpRequest::Rmdir { path } => self
                .session
                .rmdir(&path)
                .map_or_else(SftpResponse::error, |_| SftpResponse::ok()),
        }
    }
}

fn request_name(request: &SftpRequest) -> &'static str {
    match request {
        SftpRequest::RealPath { .. } => "realpath",
        SftpRequest::Stat { .. } => "stat",
        SftpRequest::LStat { .. } => "lstat",
        SftpRequest::OpenDir { .. } => "opendir",
        SftpRequest::ReadDir { .. } => "readdir",
        SftpRequest::Open { .. } => "open",
        SftpRequest::Read { .. } => "read",
        SftpRequest::Write { .. } => "write",
        SftpRequest::FStat { .. } => "fstat",
        SftpRequest::Close { .. } => "close",
        SftpRequest::Remove { .. } => "remove",
        SftpRequest::Rename { .. } => "rename",
        SftpRequest::Mkdir { .. } => "mkdir",
        SftpRequest::Rmdir { .. } => "rmdir",
    }
}
