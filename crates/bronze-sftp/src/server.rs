//! Connection server.
//!
//! Accepts TCP connections and serves each one on a bounded pool of OS threads.
//! The SSH handshake and SFTP packet codec sit behind [`SessionTransport`]; the
//! server only authenticates through it and feeds decoded requests to the
//! session's dispatcher.

use anyhow::{Context, Result};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use crate::dispatcher::{SftpDispatcher, SftpRequest, SftpResponse};
use crate::notifier::UploadNotifier;
use crate::users::UserDirectory;
use crate::vfs::Session;

/// One authenticated SFTP channel over a connection.
pub trait SessionTransport: Send {
    /// Run authentication against the directory. `None` means the client failed.
    fn authenticate(&mut self, users: &UserDirectory) -> io::Result<Option<String>>;

    /// Next decoded request and its id, or `None` when the client disconnects.
    fn next_request(&mut self) -> io::Result<Option<(u32, SftpRequest)>>;

    fn send_response(&mut self, id: u32, response: SftpResponse) -> io::Result<()>;
}

/// Wraps accepted sockets in a protocol transport.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: SessionTransport;

    fn accept(&self, stream: TcpStream) -> io::Result<Self::Transport>;
}

/// Stops a running accept loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);

        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        // Unblock accept(); the loop sees the flag on the next connection.
        if let Err(e) = TcpStream::connect(wake) {
            tracing::debug!(addr = %wake, error = %e, "Wake-up connect failed");
        }
    }
}

pub struct SftpServer<F: TransportFactory> {
    factory: Arc<F>,
    users: Arc<UserDirectory>,
    upload_root: PathBuf,
    notifier: UploadNotifier,
    max_sessions: usize,
    shutdown: Arc<AtomicBool>,
}

impl<F: TransportFactory> SftpServer<F> {
    pub fn new(
        factory: F,
        users: Arc<UserDirectory>,
        upload_root: PathBuf,
        notifier: UploadNotifier,
        max_sessions: usize,
    ) -> Self {
        Self {
            factory: Arc::new(factory),
            users,
            upload_root,
            notifier,
            max_sessions: max_sessions.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self, addr: SocketAddr) -> ShutdownHandle {
        ShutdownHandle {
            flag: self.shutdown.clone(),
            addr,
        }
    }

    /// Accept connections until shut down. Blocks the calling thread.
    ///
    /// When every worker is busy and the queue is full, accepting pauses.
    pub fn serve(self, listener: TcpListener) -> io::Result<()> {
        let (tx, rx) = mpsc::sync_channel::<TcpStream>(self.max_sessions);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.max_sessions);
        for worker_id in 0..self.max_sessions {
            let rx = rx.clone();
            let factory = self.factory.clone();
            let users = self.users.clone();
            let upload_root = self.upload_root.clone();
            let notifier = self.notifier.clone();

            let worker = thread::Builder::new()
                .name(format!("sftp-session-{}", worker_id))
                .spawn(move || loop {
                    let next = match rx.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };
                    let Ok(stream) = next else {
                        break;
                    };

                    let peer = stream.peer_addr().ok();
                    if let Err(e) =
                        handle_connection(factory.as_ref(), &users, &upload_root, &notifier, stream)
                    {
                        tracing::warn!(peer = ?peer, error = %e, "SFTP connection ended with error");
                    }
                })?;
            workers.push(worker);
        }

        tracing::info!(
            addr = ?listener.local_addr().ok(),
            max_sessions = self.max_sessions,
            "SFTP server listening"
        );

        for incoming in listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match incoming {
                Ok(stream) => {
                    tracing::debug!(peer = ?stream.peer_addr().ok(), "Accepted connection");
                    if tx.send(stream).is_err() {
                        tracing::error!("Session pool is gone, stopping accept loop");
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
            }
        }

        drop(tx);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("SFTP session worker panicked");
            }
        }

        tracing::info!("SFTP server stopped");
        Ok(())
    }
}

fn handle_connection<F: TransportFactory>(
    factory: &F,
    users: &UserDirectory,
    upload_root: &Path,
    notifier: &UploadNotifier,
    stream: TcpStream,
) -> Result<()> {
    let transport = factory
        .accept(stream)
        .context("Failed to establish session transport")?;
    serve_session(transport, users, upload_root, notifier)
}

/// Authenticate, then answer requests until the client goes away.
pub fn serve_session<T: SessionTransport>(
    mut transport: T,
    users: &UserDirectory,
    upload_root: &Path,
    notifier: &UploadNotifier,
) -> Result<()> {
    let Some(username) = transport
        .authenticate(users)
        .context("Authentication exchange failed")?
    else {
        tracing::info!("Client failed authentication");
        return Ok(());
    };

    let session = Session::open(
        upload_root,
        &username,
        users.permissions(&username),
        Some(notifier.clone()),
    )
    .with_context(|| format!("Failed to open session for {}", username))?;

    let mut dispatcher = SftpDispatcher::new(session);
    while let Some((id, request)) = transport.next_request()? {
        let response = dispatcher.handle(request);
        transport.send_response(id, response)?;
    }

    tracing::info!(username = %username, "SFTP session closed");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dispatcher::SftpStatus;
    use crate::vfs::OpenFlags;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    /// Transport that replays a fixed script and records responses.
    pub(crate) struct ScriptedTransport {
        pub credentials: (String, String),
        pub requests: VecDeque<SftpRequest>,
        pub responses: Arc<Mutex<Vec<SftpResponse>>>,
        next_id: u32,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            username: &str,
            password: &str,
            requests: Vec<SftpRequest>,
            responses: Arc<Mutex<Vec<SftpResponse>>>,
        ) -> Self {
            Self {
                credentials: (username.to_string(), password.to_string()),
                requests: requests.into(),
                responses,
                next_id: 0,
            }
        }
    }

    impl SessionTransport for ScriptedTransport {
        fn authenticate(&mut self, users: &UserDirectory) -> io::Result<Option<String>> {
            let (username, password) = &self.credentials;
            Ok(users
                .authenticate_password(username, password)
                .then(|| username.clone()))
        }

        fn next_request(&mut self) -> io::Result<Option<(u32, SftpRequest)>> {
            self.next_id += 1;
            Ok(self.requests.pop_front().map(|r| (self.next_id, r)))
        }

        fn send_response(&mut self, _id: u32, response: SftpResponse) -> io::Result<()> {
            self.responses.lock().unwrap().push(response);
            Ok(())
        }
    }

    fn upload_script(path: &str, data: &[u8]) -> Vec<SftpRequest> {
        vec![
            SftpRequest::Open {
                path: path.to_string(),
                flags: OpenFlags::upload(),
            },
            SftpRequest::Write {
                handle: "0".to_string(),
                offset: 0,
                data: data.to_vec(),
            },
            SftpRequest::Close {
                handle: "0".to_string(),
            },
        ]
    }

    #[test]
    fn test_authenticated_session_uploads() {
        let upload_root = tempdir().unwrap();
        let users = UserDirectory::parse("alice:secret:read+write");
        let (notifier, mut rx) = UploadNotifier::channel(4);
        let responses = Arc::new(Mutex::new(Vec::new()));

        let transport = ScriptedTransport::new(
            "alice",
            "secret",
            upload_script("/lab.hl7", b"MSH|"),
            responses.clone(),
        );
        serve_session(transport, &users, upload_root.path(), &notifier).unwrap();

        let responses = responses.lock().unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], SftpResponse::Handle("0".to_string()));
        assert_eq!(responses[2].status_code(), Some(SftpStatus::Ok));

        let landed = rx.try_recv().unwrap();
        assert_eq!(landed.username, "alice");
        assert_eq!(landed.size, 4);
        assert!(upload_root.path().join("alice/lab.hl7").is_file());
    }

    #[test]
    fn test_failed_authentication_serves_nothing() {
        let upload_root = tempdir().unwrap();
        let users = UserDirectory::parse("alice:secret");
        let (notifier, mut rx) = UploadNotifier::channel(4);
        let responses = Arc::new(Mutex::new(Vec::new()));

        let transport = ScriptedTransport::new(
            "alice",
            "wrong",
            upload_script("/x.json", b"{}"),
            responses.clone(),
        );
        serve_session(transport, &users, upload_root.path(), &notifier).unwrap();

        assert!(responses.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
        assert!(!upload_root.path().join("alice").exists());
    }

    #[test]
    fn test_sessions_are_confined_per_user() {
        let upload_root = tempdir().unwrap();
        let users = UserDirectory::parse("alice:a|bob:b");
        let (notifier, _rx) = UploadNotifier::channel(4);
        let responses = Arc::new(Mutex::new(Vec::new()));

        let transport = ScriptedTransport::new(
            "bob",
            "b",
            upload_script("../alice/evil.txt", b"x"),
            responses.clone(),
        );
        serve_session(transport, &users, upload_root.path(), &notifier).unwrap();

        let responses = responses.lock().unwrap();
        assert_eq!(responses[0].status_code(), Some(SftpStatus::PermissionDenied));
        assert!(!upload_root.path().join("alice/evil.txt").exists());
    }
}
