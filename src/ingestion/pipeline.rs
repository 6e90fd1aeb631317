//! Ingestion Pipeline - one blob from trigger to summary
//!
//! Steps, in order: verify store credentials, decode the header and rows, enrich
//! each row with a partition key and id, write in batches, log the summary.
//! Only an unusable store or header stops a run before any write.

use crate::config::IngestConfig;
use crate::error::{DecodeError, IngestError, Result, RunFailure};
use crate::ingestion::accumulator::IngestionResult;
use crate::ingestion::batch_writer::{BatchWriter, WriterOptions};
use crate::ingestion::decoder::Decoder;
use crate::ingestion::enricher::Enricher;
use crate::observability::progress::{ProgressObserver, TracingProgress};
use crate::store::DocumentStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// A newly arrived blob
#[derive(Debug, Clone)]
pub struct BlobEvent {
    pub name: String,
    /// Size in bytes
    pub length: u64,
    pub content: Vec<u8>,
}

impl BlobEvent {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            length: content.len() as u64,
            content,
        }
    }

    /// Read a local file as if it had been uploaded under its file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let start = Instant::now();
        let content = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!(
            "Blob read completed in {:.2} seconds. Content size: {} bytes",
            start.elapsed().as_secs_f64(),
            content.len()
        );
        Ok(Self::new(name, content))
    }
}

/// Everything a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub blob_name: String,
    pub columns: Vec<String>,
    pub result: IngestionResult,
    /// Lines skipped by the decoder; never submitted to the store
    pub decode_failures: Vec<DecodeError>,
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    config: IngestConfig,
    observer: Arc<dyn ProgressObserver>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn DocumentStore>, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            observer: Arc::new(TracingProgress),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub async fn run(&self, blob: &BlobEvent) -> std::result::Result<IngestionReport, RunFailure> {
        self.config.validate().map_err(RunFailure::before_write)?;

        info!(
            "Function triggered for blob: {}, Size: {} bytes",
            blob.name, blob.length
        );

        self.authenticate().await.map_err(RunFailure::before_write)?;

        let decoder = Decoder::new(&blob.content).map_err(|e| {
            error!("CSV header could not be decoded: {}", e);
            RunFailure::before_write(e.into())
        })?;
        info!("CSV columns detected: {:?}", decoder.columns());

        let decoded = decoder.decode_all();
        if !decoded.failures.is_empty() {
            warn!("{} CSV lines were rejected during decoding", decoded.failures.len());
        }

        let mut report = IngestionReport {
            blob_name: blob.name.clone(),
            columns: decoded.columns,
            result: IngestionResult::default(),
            decode_failures: decoded.failures,
        };

        if decoded.rows.is_empty() {
            warn!("No data rows found in CSV");
            return Ok(report);
        }

        if !decoder.has_column(&self.config.partition_key_column) {
            warn!(
                "No '{}' column found. Using default partition key '{}'.",
                self.config.partition_key_column, self.config.partition_key_default
            );
        }

        let records = Enricher::from_config(&self.config)
            .for_blob(&blob.name)
            .enrich_all(decoded.rows);

        let writer = BatchWriter::new(
            Arc::clone(&self.store),
            WriterOptions::from_config(&self.config),
        )
        .with_observer(Arc::clone(&self.observer));

        let result = writer.write_all(records).await.map_err(|failure| {
            error!(
                "Processing aborted: {} successful, {} failed of {} records",
                failure.partial.successful, failure.partial.failed, failure.partial.total_rows
            );
            failure
        })?;

        info!(
            "Processing completed: {} successful, {} failed in {:.2} seconds",
            result.successful,
            result.failed,
            result.elapsed.as_secs_f64()
        );
        info!("Average: {:.1} rows/second", result.rows_per_second);

        if result.successful > 0 {
            info!(
                "Successfully processed {} records into {} store",
                result.successful,
                self.store.name()
            );
        }
        if result.failed > 0 {
            warn!("{} records failed to process", result.failed);
        }

        report.result = result;
        Ok(report)
    }

    async fn authenticate(&self) -> Result<()> {
        info!("Testing {} store authentication...", self.store.name());
        match self.store.check_auth().await {
            Ok(databases) => {
                info!("Authentication successful! Found {} databases", databases);
                Ok(())
            }
            Err(e) => {
                error!("Store authentication failed - stopping processing: {}", e);
                Err(match e {
                    IngestError::Auth(_) => e,
                    other => IngestError::Auth(other.to_string()),
                })
            }
        }
    }
}
