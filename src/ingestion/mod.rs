//! Blob ingestion: CSV decoding, enrichment, batched writes and result tracking.

pub mod accumulator;
pub mod batch_writer;
pub mod decoder;
pub mod enricher;
pub mod pipeline;

pub use accumulator::{Accumulator, BatchOutcome, IngestionResult, WriteOutcome};
pub use batch_writer::{partition, Batch, BatchWriter, WriterOptions};
pub use decoder::{Decoded, Decoder, Row, Rows};
pub use enricher::{Enricher, Record};
pub use pipeline::{BlobEvent, IngestionReport, Pipeline};
