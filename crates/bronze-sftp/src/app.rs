//! SFTP service bootstrap
//!
//! Loads the user directory, binds the listener, starts the upload event
//! publisher on the async runtime and runs the accept loop on its own thread.

use anyhow::{Context, Result};
use bronze_core::SftpConfig;
use bronze_worker::EventPublisher;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use tokio::task::JoinHandle;

use crate::notifier::{spawn_publisher, UploadNotifier};
use crate::server::{ShutdownHandle, SftpServer, TransportFactory};
use crate::users::UserDirectory;

pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    accept_thread: thread::JoinHandle<std::io::Result<()>>,
    publisher: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, wait for open sessions to finish, then drain pending
    /// upload events.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.trigger();

        let accept_thread = self.accept_thread;
        tokio::task::spawn_blocking(move || accept_thread.join())
            .await
            .context("Failed to join accept loop")?
            .map_err(|_| anyhow::anyhow!("SFTP accept loop panicked"))?
            .context("SFTP accept loop failed")?;

        self.publisher
            .await
            .context("Upload event publisher panicked")?;
        Ok(())
    }
}

/// Start the SFTP front door. Must be called from within a tokio runtime.
pub fn start_sftp_server<F, P>(
    config: &SftpConfig,
    topic: &str,
    publisher: Arc<P>,
    factory: F,
) -> Result<RunningServer>
where
    F: TransportFactory,
    P: EventPublisher + ?Sized + 'static,
{
    let users = UserDirectory::from_config(config);
    if users.is_empty() {
        tracing::warn!("No SFTP users configured; every login will be refused");
    }
    tracing::info!(users = users.len(), "User directory loaded");

    std::fs::create_dir_all(&config.upload_root).with_context(|| {
        format!(
            "Failed to create upload root {}",
            config.upload_root.display()
        )
    })?;

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let local_addr = listener.local_addr()?;

    let (notifier, rx) = UploadNotifier::channel(config.event_buffer);
    let publisher = spawn_publisher(rx, publisher, topic.to_string());

    let server = SftpServer::new(
        factory,
        Arc::new(users),
        config.upload_root.clone(),
        notifier,
        config.max_sessions,
    );
    let shutdown = server.shutdown_handle(local_addr);

    let accept_thread = thread::Builder::new()
        .name("sftp-accept".to_string())
        .spawn(move || server.serve(listener))
        .context("Failed to spawn accept loop")?;

    tracing::info!(addr = %local_addr, upload_root = %config.upload_root.display(), "SFTP server started");

    Ok(RunningServer {
        local_addr,
        shutdown,
        accept_thread,
        publisher,
    })
}
