//! Bronze Worker Library
//!
//! Consumes ingestion envelopes from the message transport and drives each one
//! through fingerprinting, deduplication, provenance logging and storage.
//!
//! - [`pipeline::ApiPipeline`] handles envelopes from the request-based front door
//! - [`pipeline::SftpPipeline`] handles files landed through the file-drop front door
//! - [`runner::run_consumer`] is the fetch/process/commit loop
//! - [`app`] wires configuration, database, storage and transport together

pub mod app;
pub mod pipeline;
pub mod runner;
pub mod test_helpers;
pub mod transport;
pub mod writer;

pub use pipeline::{ApiPipeline, SftpPipeline};
pub use runner::{run_consumer, EnvelopeProcessor};
pub use transport::{
    ChannelConsumer, ChannelPublisher, ChannelTransport, Delivery, EnvelopeConsumer, EventPublisher,
    LineConsumer,
};
pub use writer::StorageWriter;
