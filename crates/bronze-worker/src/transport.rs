//! Message transport seam.
//!
//! The production broker is an external collaborator. The pipeline only sees
//! these traits: a consumer that yields one delivery at a time and is told when
//! a delivery may be committed, and a publisher for fire-and-forget events.

use async_trait::async_trait;
use bronze_core::AppError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};

/// One message fetched from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub offset: u64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait EnvelopeConsumer: Send {
    /// Next delivery, or `None` once the transport is closed.
    async fn next(&mut self) -> Option<Delivery>;

    /// Mark a delivery as consumed.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), AppError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), AppError>;
}

/// In-process transport backed by a bounded tokio channel.
///
/// Offsets increase monotonically per transport. Used by tests and by
/// single-process deployments where the front door and worker share a runtime.
pub struct ChannelTransport;

impl ChannelTransport {
    pub fn bounded(capacity: usize) -> (ChannelPublisher, ChannelConsumer) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let committed = Arc::new(Mutex::new(None));

        (
            ChannelPublisher {
                tx,
                next_offset: Arc::new(AtomicU64::new(0)),
            },
            ChannelConsumer { rx, committed },
        )
    }
}

#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Delivery>,
    next_offset: Arc<AtomicU64>,
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), AppError> {
        let delivery = Delivery {
            topic: topic.to_string(),
            offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
            payload,
        };

        self.tx
            .send(delivery)
            .await
            .map_err(|_| AppError::Transport(format!("Channel for topic {} is closed", topic)))
    }
}

pub struct ChannelConsumer {
    rx: mpsc::Receiver<Delivery>,
    committed: Arc<Mutex<Option<u64>>>,
}

impl ChannelConsumer {
    /// Offset of the last committed delivery.
    pub async fn committed_offset(&self) -> Option<u64> {
        *self.committed.lock().await
    }
}

#[async_trait]
impl EnvelopeConsumer for ChannelConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), AppError> {
        let mut committed = self.committed.lock().await;
        check_commit_order(*committed, delivery.offset)?;
        *committed = Some(delivery.offset);
        Ok(())
    }
}

fn check_commit_order(last: Option<u64>, offset: u64) -> Result<(), AppError> {
    match last {
        Some(last) if offset < last => Err(AppError::Transport(format!(
            "Commit of offset {} after {}",
            offset, last
        ))),
        _ => Ok(()),
    }
}

/// Consumer reading one message per line, e.g. a broker console consumer piped
/// into stdin. Blank lines are skipped; offsets count delivered lines.
pub struct LineConsumer<R> {
    lines: Lines<R>,
    topic: String,
    next_offset: u64,
    committed: Option<u64>,
}

impl<R: AsyncBufRead + Unpin + Send> LineConsumer<R> {
    pub fn new(reader: R, topic: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            topic: topic.into(),
            next_offset: 0,
            committed: None,
        }
    }

    pub fn committed_offset(&self) -> Option<u64> {
        self.committed
    }
}

impl LineConsumer<BufReader<Stdin>> {
    pub fn stdin(topic: impl Into<String>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), topic)
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EnvelopeConsumer for LineConsumer<R> {
    async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let offset = self.next_offset;
                    self.next_offset += 1;
                    return Some(Delivery {
                        topic: self.topic.clone(),
                        offset,
                        payload: line.into_bytes(),
                    });
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!(topic = %self.topic, error = %e, "Failed to read next line, closing consumer");
                    return None;
                }
            }
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), AppError> {
        check_commit_order(self.committed, delivery.offset)?;
        self.committed = Some(delivery.offset);
        Ok(())
    }
}
