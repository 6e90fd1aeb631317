//! Document Store - the narrow write interface the batch writer depends on
//!
//! Implementations:
//! - CosmosStore: Azure Cosmos DB SQL API over REST
//! - JsonlStore: newline-delimited JSON file, one document per line
//! - MemoryStore: in-process map, for dry runs and tests

pub mod cosmos;
pub mod jsonl;
pub mod memory;

pub use cosmos::CosmosStore;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use crate::error::{Result, WriteError};
use crate::ingestion::enricher::Record;
use async_trait::async_trait;

/// Document store write capability
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store name used in logs (e.g., "cosmos", "jsonl", "memory")
    fn name(&self) -> &str;

    /// Verify credentials before any record is processed.
    ///
    /// Returns the number of databases visible to the credential. A failure here
    /// is fatal for the run.
    async fn check_auth(&self) -> Result<usize>;

    /// Create one document. Ids must be unique within the target collection.
    async fn create(&self, record: &Record) -> std::result::Result<(), WriteError>;
}
