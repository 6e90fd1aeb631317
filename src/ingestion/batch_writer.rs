//! Batch Writer - chunks records into fixed-size batches and writes every
//! record individually, so one failed write never aborts its batch or the run.
//!
//! With `max_concurrency == 1` batches run strictly one after another. Higher
//! values fan batches out over a bounded set of tokio tasks; batch membership is
//! fixed before dispatch and results are folded with a commutative accumulator.

use crate::config::IngestConfig;
use crate::error::{IngestError, RunFailure, WriteError};
use crate::ingestion::accumulator::{Accumulator, BatchOutcome, IngestionResult, WriteOutcome};
use crate::ingestion::enricher::Record;
use crate::observability::progress::{BatchProgress, ProgressObserver, TracingProgress};
use crate::store::DocumentStore;
use chrono::Utc;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

/// Consecutive slice of the record sequence
#[derive(Clone, Debug)]
pub struct Batch {
    /// 1-based batch number
    pub index: usize,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split records into consecutive batches of `batch_size` (the last may be shorter).
pub fn partition(records: Vec<Record>, batch_size: usize) -> Vec<Batch> {
    let chunks = records.into_iter().chunks(batch_size.max(1));
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            records: chunk.collect(),
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct WriterOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub failure_log_limit: usize,
    pub abort_on_outage: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl WriterOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrency,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            failure_log_limit: config.failure_log_limit,
            abort_on_outage: config.abort_on_outage,
        }
    }
}

pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
    options: WriterOptions,
    observer: Arc<dyn ProgressObserver>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn DocumentStore>, options: WriterOptions) -> Self {
        Self {
            store,
            options,
            observer: Arc::new(TracingProgress),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Write every record. Per-record failures are counted, never propagated.
    ///
    /// The only error is an outage abort (`abort_on_outage`), which carries the
    /// counts for every batch that finished before the run stopped.
    pub async fn write_all(
        &self,
        records: Vec<Record>,
    ) -> std::result::Result<IngestionResult, RunFailure> {
        let start = Instant::now();
        let mut state = RunState::new(records.len(), Arc::clone(&self.observer), self.options.abort_on_outage);
        let batches = partition(records, self.options.batch_size);

        info!(
            "Starting batch processing: {} records in {} batches of up to {} (concurrency {})",
            state.acc.current().total_rows,
            batches.len(),
            self.options.batch_size,
            self.options.max_concurrency
        );

        if self.options.max_concurrency <= 1 {
            self.run_sequential(batches, &mut state).await;
        } else {
            self.run_concurrent(batches, &mut state).await;
        }

        let aborted = state.aborted.take();
        let result = state.acc.finish(start.elapsed());
        match aborted {
            Some(reason) => Err(RunFailure::new(IngestError::StoreUnavailable(reason), result)),
            None => Ok(result),
        }
    }

    async fn run_sequential(&self, batches: Vec<Batch>, state: &mut RunState) {
        for batch in batches {
            let outcome = write_batch(self.store.as_ref(), batch, &self.options).await;
            state.complete(outcome);
            if state.aborted.is_some() {
                break;
            }
        }
    }

    async fn run_concurrent(&self, batches: Vec<Batch>, state: &mut RunState) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchOutcome>();
        // Batches dispatched but not yet reported, by index
        let mut in_flight: BTreeMap<usize, usize> = BTreeMap::new();

        for batch in batches {
            while let Ok(outcome) = rx.try_recv() {
                in_flight.remove(&outcome.index);
                state.complete(outcome);
            }
            if state.aborted.is_some() {
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            in_flight.insert(batch.index, batch.len());

            let store = Arc::clone(&self.store);
            let options = self.options.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let outcome = write_batch(store.as_ref(), batch, &options).await;
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            in_flight.remove(&outcome.index);
            state.complete(outcome);
        }

        // A task that panicked never reported; its records still need an outcome.
        for (index, len) in in_flight {
            error!("Batch {} worker stopped before reporting; counting {} records as failed", index, len);
            let reason = WriteError::Other("batch worker panicked".to_string());
            state.complete(BatchOutcome {
                index,
                outcomes: vec![WriteOutcome::Failure(reason); len],
                elapsed: Duration::ZERO,
            });
        }
    }
}

/// Accumulator plus progress reporting shared by both scheduling modes
struct RunState {
    acc: Accumulator,
    observer: Arc<dyn ProgressObserver>,
    abort_on_outage: bool,
    aborted: Option<String>,
}

impl RunState {
    fn new(total_rows: usize, observer: Arc<dyn ProgressObserver>, abort_on_outage: bool) -> Self {
        Self {
            acc: Accumulator::new(total_rows),
            observer,
            abort_on_outage,
            aborted: None,
        }
    }

    fn complete(&mut self, outcome: BatchOutcome) {
        self.acc.record_batch(&outcome);

        let current = self.acc.current();
        let progress = BatchProgress {
            timestamp: Utc::now(),
            batch_index: outcome.index,
            batch_size: outcome.len(),
            successful: outcome.successful(),
            failed: outcome.failed(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            cumulative_processed: current.processed(),
            cumulative_successful: current.successful,
            total_rows: current.total_rows,
            percent_complete: self.acc.percent_complete(),
        };
        self.observer.on_batch(&progress);

        if self.abort_on_outage && self.aborted.is_none() && outcome.is_total_outage() {
            let reason = outcome
                .failures()
                .next()
                .map(|e| e.to_string())
                .unwrap_or_default();
            error!(
                "Every write in batch {} failed with the store unreachable; stopping run: {}",
                outcome.index, reason
            );
            self.aborted = Some(format!("batch {}: {}", outcome.index, reason));
        }
    }
}

/// Write one batch record by record, logging at most `failure_log_limit` failures in detail.
async fn write_batch(store: &dyn DocumentStore, batch: Batch, options: &WriterOptions) -> BatchOutcome {
    let start = Instant::now();
    let mut outcomes = Vec::with_capacity(batch.len());
    let mut failed = 0usize;

    for record in &batch.records {
        let outcome = write_with_retry(store, record, options).await;
        if let WriteOutcome::Failure(ref e) = outcome {
            failed += 1;
            if failed <= options.failure_log_limit {
                error!(
                    "Failed to insert record {} (line {}) in batch {}: {}",
                    record.id,
                    record.row.line(),
                    batch.index,
                    e
                );
            }
        }
        outcomes.push(outcome);
    }

    if failed > options.failure_log_limit {
        warn!(
            "Batch {}: {} more failures not logged in detail",
            batch.index,
            failed - options.failure_log_limit
        );
    }

    BatchOutcome {
        index: batch.index,
        outcomes,
        elapsed: start.elapsed(),
    }
}

/// Bounded per-record retry; the final attempt decides the single outcome.
async fn write_with_retry(store: &dyn DocumentStore, record: &Record, options: &WriterOptions) -> WriteOutcome {
    let mut attempt = 0u32;
    loop {
        match store.create(record).await {
            Ok(()) => return WriteOutcome::Success,
            Err(e) if e.is_retryable() && attempt < options.max_retries => {
                attempt += 1;
                debug!(
                    "Retrying record {} after {} (attempt {}/{})",
                    record.id,
                    e.kind(),
                    attempt,
                    options.max_retries
                );
                tokio::time::sleep(options.retry_backoff * attempt).await;
            }
            Err(e) => return WriteOutcome::Failure(e),
        }
    }
}
