//! JSONL document store - appends each created document as one JSON line

use crate::error::{IngestError, Result, WriteError};
use crate::ingestion::enricher::Record;
use crate::store::DocumentStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub struct JsonlStore {
    path: PathBuf,
    partition_key_field: String,
    inner: Mutex<JsonlInner>,
}

struct JsonlInner {
    file: File,
    ids: HashSet<String>,
}

impl JsonlStore {
    /// Open (or create) the file. Ids already present in the file are loaded so
    /// that re-runs see the same conflicts a real collection would report.
    pub fn open(path: impl AsRef<Path>, partition_key_field: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut ids = HashSet::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let doc: serde_json::Value = serde_json::from_str(&line)?;
                if let Some(id) = doc.get("id").and_then(|v| v.as_str()) {
                    ids.insert(id.to_string());
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                IngestError::Config(format!("cannot open output file {}: {}", path.display(), e))
            })?;

        info!("JSONL store at {} ({} existing documents)", path.display(), ids.len());

        Ok(Self {
            path,
            partition_key_field: partition_key_field.into(),
            inner: Mutex::new(JsonlInner { file, ids }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.ids.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn check_auth(&self) -> Result<usize> {
        let metadata = std::fs::metadata(&self.path)?;
        if metadata.permissions().readonly() {
            return Err(IngestError::Auth(format!(
                "{} is read-only",
                self.path.display()
            )));
        }
        Ok(1)
    }

    async fn create(&self, record: &Record) -> std::result::Result<(), WriteError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| WriteError::Other("jsonl store lock poisoned".to_string()))?;

        if inner.ids.contains(&record.id) {
            return Err(WriteError::Conflict(format!(
                "document with id '{}' already exists",
                record.id
            )));
        }

        let doc = record.to_document(&self.partition_key_field);
        let line = serde_json::to_string(&doc)
            .map_err(|e| WriteError::Rejected(format!("document not serializable: {}", e)))?;
        writeln!(inner.file, "{}", line)
            .map_err(|e| WriteError::Unavailable(format!("write to {} failed: {}", self.path.display(), e)))?;

        inner.ids.insert(record.id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::decoder::Row;

    fn record(id: &str) -> Record {
        Record {
            row: Row::from_pairs([("sensor", "s1"), ("timestamp", "t")]),
            partition_key: "t".to_string(),
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_appends_documents_and_reloads_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let store = JsonlStore::open(&path, "TimestampID").unwrap();
        assert_eq!(store.check_auth().await.unwrap(), 1);
        store.create(&record("r1")).await.unwrap();
        store.create(&record("r2")).await.unwrap();
        drop(store);

        let contents = std::fs::read_to_string(&path).unwrap();
        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["sensor"], "s1");
        assert_eq!(first["TimestampID"], "t");
        assert_eq!(first["id"], "r1");

        let reopened = JsonlStore::open(&path, "TimestampID").unwrap();
        assert_eq!(reopened.len(), 2);
        let err = reopened.create(&record("r1")).await.unwrap_err();
        assert!(matches!(err, WriteError::Conflict(_)));
    }
}
