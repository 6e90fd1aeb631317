use crate::config::DEFAULT_PARTITION_KEY_FIELD;
use crate::error::{Result, WriteError};
use crate::ingestion::enricher::Record;
use crate::store::DocumentStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory collection keyed by document id
pub struct MemoryStore {
    partition_key_field: String,
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_partition_key_field(DEFAULT_PARTITION_KEY_FIELD)
    }

    pub fn with_partition_key_field(field: impl Into<String>) -> Self {
        Self {
            partition_key_field: field.into(),
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.documents.lock().ok().and_then(|d| d.get(id).cloned())
    }

    pub fn documents(&self) -> Vec<Value> {
        self.documents
            .lock()
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_auth(&self) -> Result<usize> {
        Ok(1)
    }

    async fn create(&self, record: &Record) -> std::result::Result<(), WriteError> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| WriteError::Other("memory store lock poisoned".to_string()))?;

        if documents.contains_key(&record.id) {
            return Err(WriteError::Conflict(format!(
                "document with id '{}' already exists",
                record.id
            )));
        }
        documents.insert(
            record.id.clone(),
            record.to_document(&self.partition_key_field),
        );
        Ok(())
    }
}
