//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use blob_ingest::config::DEFAULT_PARTITION_KEY_FIELD;
use blob_ingest::error::{Result, WriteError};
use blob_ingest::ingestion::{BlobEvent, Record};
use blob_ingest::store::{DocumentStore, MemoryStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory-backed store that rejects the records whose `seq` column is listed.
pub struct FailingStore {
    inner: MemoryStore,
    fail_seqs: HashSet<String>,
    failure: fn(String) -> WriteError,
    pub attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new(fail_seqs: &[u32]) -> Self {
        Self::with_failure(fail_seqs, WriteError::Rejected)
    }

    pub fn with_failure(fail_seqs: &[u32], failure: fn(String) -> WriteError) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_seqs: fail_seqs.iter().map(|s| s.to_string()).collect(),
            failure,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }

    pub fn stored_seqs(&self) -> Vec<String> {
        let mut seqs: Vec<String> = self
            .inner
            .documents()
            .iter()
            .filter_map(|d| d["seq"].as_str().map(str::to_string))
            .collect();
        seqs.sort_by_key(|s| s.parse::<u32>().unwrap_or(u32::MAX));
        seqs
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn check_auth(&self) -> Result<usize> {
        Ok(1)
    }

    async fn create(&self, record: &Record) -> std::result::Result<(), WriteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let seq = record.row.get("seq").unwrap_or_default();
        if self.fail_seqs.contains(seq) {
            return Err((self.failure)(format!("record {} refused", seq)));
        }
        self.inner.create(record).await
    }
}

/// CSV with `timestamp,seq,value` columns and rows numbered from 1.
pub fn sensor_csv(rows: usize) -> String {
    let mut csv = String::from("timestamp,seq,value\n");
    for i in 1..=rows {
        csv.push_str(&format!("2024-03-01T00:{:02}:00Z,{},{}.5\n", i % 60, i, i));
    }
    csv
}

pub fn blob(name: &str, csv: &str) -> BlobEvent {
    BlobEvent::new(name, csv.as_bytes().to_vec())
}

pub fn partition_field() -> &'static str {
    DEFAULT_PARTITION_KEY_FIELD
}
