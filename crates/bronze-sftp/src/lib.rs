//! Bronze SFTP Library
//!
//! The file-drop front door. Each authenticated connection gets a session
//! confined to `<upload_root>/<username>`; files closed after writing are
//! announced as upload completion events for the storage worker.
//!
//! The SSH handshake and packet codec are external and plug in through
//! [`server::SessionTransport`]. When an external SFTP daemon owns the upload
//! root instead, [`watcher::watch_uploads`] announces the files it lands.

pub mod app;
pub mod dispatcher;
pub mod handle;
pub mod notifier;
pub mod server;
pub mod users;
pub mod vfs;
pub mod watcher;

pub use app::{start_sftp_server, RunningServer};
pub use dispatcher::{SftpDispatcher, SftpRequest, SftpResponse, SftpStatus};
pub use handle::FileHandle;
pub use notifier::{spawn_publisher, FileLanded, UploadNotifier};
pub use server::{SessionTransport, SftpServer, TransportFactory};
pub use users::{DirectoryError, Permission, PublicKey, SftpUser, UserDirectory};
pub use vfs::{DirEntry, FileAttributes, OpenFlags, Session, VfsError};
pub use watcher::{watch_uploads, UploadWatcher};
