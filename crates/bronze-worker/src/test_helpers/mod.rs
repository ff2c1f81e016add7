//! Test helpers for pipeline tests
//!
//! In-memory implementations of the metadata store, the ingestion log and
//! object storage, so pipelines can be exercised without a database.

pub mod mock_repositories;
pub mod mock_storage;

pub use mock_repositories::{MockIngestionLog, MockMetadataStore};
pub use mock_storage::MockStorage;
