//! Blob-triggered CSV ingestion into a document store.
//!
//! A blob arrives, its CSV rows are decoded against the header line, each row is
//! enriched with a partition key and an id, and the resulting documents are
//! written in batches. Per-record failures are counted, not propagated.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod observability;
pub mod store;

pub use config::{CosmosConfig, IdStrategy, IngestConfig};
pub use error::{DecodeError, IngestError, Result, RunFailure, WriteError};
pub use ingestion::{BlobEvent, IngestionReport, IngestionResult, Pipeline};
pub use store::DocumentStore;
