//! Consumer loop: fetch one message, process it fully, commit.
//!
//! Processing failures are logged and the message is committed anyway, so a
//! poison message never blocks the partition. Storage failures are already
//! recorded in the ingestion log by the pipeline.

use async_trait::async_trait;
use bronze_core::{AppError, ErrorMetadata, LogLevel};

use crate::transport::EnvelopeConsumer;

/// Something that can process one raw transport message.
#[async_trait]
pub trait EnvelopeProcessor: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    async fn process(&self, payload: &[u8]) -> Result<(), AppError>;
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Run until the consumer is exhausted. Only a commit failure ends the loop early.
pub async fn run_consumer<C, P>(consumer: &mut C, processor: &P) -> Result<ConsumerStats, AppError>
where
    C: EnvelopeConsumer + ?Sized,
    P: EnvelopeProcessor + ?Sized,
{
    let mut stats = ConsumerStats::default();
    tracing::info!(processor = processor.name(), "Consumer loop started");

    while let Some(delivery) = consumer.next().await {
        match processor.process(&delivery.payload).await {
            Ok(()) => stats.processed += 1,
            Err(e) => {
                stats.failed += 1;
                match e.log_level() {
                    LogLevel::Debug => tracing::debug!(
                        processor = processor.name(),
                        topic = %delivery.topic,
                        offset = delivery.offset,
                        error_code = e.error_code(),
                        error = %e.error_chain(),
                        "Message rejected"
                    ),
                    LogLevel::Warn => tracing::warn!(
                        processor = processor.name(),
                        topic = %delivery.topic,
                        offset = delivery.offset,
                        error_code = e.error_code(),
                        error = %e.error_chain(),
                        "Message processing failed"
                    ),
                    LogLevel::Error => tracing::error!(
                        processor = processor.name(),
                        topic = %delivery.topic,
                        offset = delivery.offset,
                        error_code = e.error_code(),
                        error = %e.error_chain(),
                        "Message processing failed"
                    ),
                }
            }
        }

        consumer.commit(&delivery).await?;
    }

    tracing::info!(
        processor = processor.name(),
        processed = stats.processed,
        failed = stats.failed,
        "Consumer loop finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, EventPublisher};
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl EnvelopeProcessor for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn process(&self, payload: &[u8]) -> Result<(), AppError> {
            self.seen.lock().unwrap().push(payload.to_vec());
            if payload == b"bad" {
                return Err(AppError::InvalidInput("bad".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_are_committed_and_loop_continues() {
        let (publisher, mut consumer) = ChannelTransport::bounded(8);
        for payload in [&b"a"[..], b"bad", b"c"] {
            publisher.publish("t", payload.to_vec()).await.unwrap();
        }
        drop(publisher);

        let processor = Recording {
            seen: Mutex::new(Vec::new()),
        };
        let stats = run_consumer(&mut consumer, &processor).await.unwrap();

        assert_eq!(stats, ConsumerStats { processed: 2, failed: 1 });
        assert_eq!(processor.seen.lock().unwrap().len(), 3);
        assert_eq!(consumer.committed_offset().await, Some(2));
    }
}
