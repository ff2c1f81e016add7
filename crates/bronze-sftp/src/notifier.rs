//! Upload completion notifier.
//!
//! Session threads hand `FileLanded` events to the async runtime over a bounded
//! channel. Sending never blocks a session: when the channel is full or closed the
//! event is dropped with a warning.

use bronze_worker::EventPublisher;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use bronze_core::SftpUploadEvent;

/// A file that was closed after being written inside a session.
#[derive(Debug, Clone, PartialEq)]
pub struct FileLanded {
    /// Absolute path of the landed file on the server's disk.
    pub path: String,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub username: String,
}

impl FileLanded {
    pub fn now(path: impl Into<String>, size: u64, username: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Self {
            path: path.into(),
            size,
            timestamp,
            username: username.into(),
        }
    }

    pub fn into_event(self) -> SftpUploadEvent {
        SftpUploadEvent::new(self.path, self.size, self.timestamp, self.username)
    }
}

#[derive(Debug, Clone)]
pub struct UploadNotifier {
    tx: mpsc::Sender<FileLanded>,
}

impl UploadNotifier {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<FileLanded>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Queue an event. Returns whether it was accepted.
    pub fn notify(&self, event: FileLanded) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(path = %event.path, username = %event.username, "Upload event channel full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(path = %event.path, username = %event.username, "Upload event channel closed, dropping event");
                false
            }
        }
    }
}

/// Forward landed files to the transport until every notifier is dropped.
pub fn spawn_publisher<P>(
    mut rx: mpsc::Receiver<FileLanded>,
    publisher: Arc<P>,
    topic: String,
) -> JoinHandle<()>
where
    P: EventPublisher + ?Sized + 'static,
{
    tokio::spawn(async move {
        while let Some(landed) = rx.recv().await {
            let path = landed.path.clone();
            let payload = match landed.into_event().to_vec() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Failed to encode upload event");
                    continue;
                }
            };

            match publisher.publish(&topic, payload).await {
                Ok(()) => tracing::info!(path = %path, topic = %topic, "Published upload event"),
                Err(e) => tracing::error!(path = %path, topic = %topic, error = %e, "Failed to publish upload event"),
            }
        }
        tracing::debug!("Upload event publisher stopped");
    })
}
