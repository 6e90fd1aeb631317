//! Enricher - derives partition key and identifier for each decoded row

use crate::config::{IdStrategy, IngestConfig};
use crate::ingestion::decoder::Row;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A row ready to be written: the decoded fields plus derived partition key and id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub row: Row,
    pub partition_key: String,
    pub id: String,
}

impl Record {
    /// Document payload sent to the store.
    ///
    /// Row columns come first in header order; `id` and `partition_key_field`
    /// always carry the derived values even when the row had columns of those names.
    pub fn to_document(&self, partition_key_field: &str) -> Value {
        let mut doc = Map::with_capacity(self.row.len() + 2);
        for (k, v) in self.row.iter() {
            if k == "id" || k == partition_key_field {
                continue;
            }
            doc.insert(k.to_string(), Value::String(v.to_string()));
        }
        doc.insert(
            partition_key_field.to_string(),
            Value::String(self.partition_key.clone()),
        );
        doc.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(doc)
    }
}

/// Turns rows into records.
#[derive(Clone, Debug)]
pub struct Enricher {
    partition_key_column: String,
    partition_key_default: String,
    id_strategy: IdStrategy,
    namespace: Uuid,
}

impl Enricher {
    pub fn new(
        partition_key_column: impl Into<String>,
        partition_key_default: impl Into<String>,
        id_strategy: IdStrategy,
    ) -> Self {
        Self {
            partition_key_column: partition_key_column.into(),
            partition_key_default: partition_key_default.into(),
            id_strategy,
            namespace: Uuid::NAMESPACE_URL,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.partition_key_column.clone(),
            config.partition_key_default.clone(),
            config.id_strategy,
        )
    }

    /// Scope deterministic ids to one blob so identical rows in different blobs differ.
    pub fn for_blob(mut self, blob_name: &str) -> Self {
        self.namespace = Uuid::new_v5(&Uuid::NAMESPACE_URL, blob_name.as_bytes());
        self
    }

    pub fn enrich(&self, row: Row) -> Record {
        let partition_key = row
            .get(&self.partition_key_column)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.partition_key_default.as_str())
            .to_string();

        let id = match self.id_strategy {
            IdStrategy::Random => Uuid::new_v4().to_string(),
            IdStrategy::Deterministic => self.content_id(&row),
        };

        Record {
            row,
            partition_key,
            id,
        }
    }

    pub fn enrich_all(&self, rows: Vec<Row>) -> Vec<Record> {
        rows.into_iter().map(|row| self.enrich(row)).collect()
    }

    fn content_id(&self, row: &Row) -> String {
        // Unit separators keep ("ab","c") and ("a","bc") apart.
        let mut name = row.line().to_string();
        for (k, v) in row.iter() {
            name.push('\u{1f}');
            name.push_str(k);
            name.push('\u{1e}');
            name.push_str(v);
        }
        Uuid::new_v5(&self.namespace, name.as_bytes()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn enricher(strategy: IdStrategy) -> Enricher {
        Enricher::new("timestamp", "default", strategy)
    }

    #[test]
    fn test_partition_key_from_timestamp() {
        let row = Row::from_pairs([("timestamp", "2024-05-01T10:00:00Z"), ("v", "1")]);
        let record = enricher(IdStrategy::Random).enrich(row);
        assert_eq!(record.partition_key, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_missing_or_empty_timestamp_uses_default() {
        let e = enricher(IdStrategy::Random);
        let missing = e.enrich(Row::from_pairs([("v", "1")]));
        let empty = e.enrich(Row::from_pairs([("timestamp", ""), ("v", "1")]));
        assert_eq!(missing.partition_key, "default");
        assert_eq!(empty.partition_key, "default");
    }

    #[test]
    fn test_partition_key_not_validated_as_timestamp() {
        let record = enricher(IdStrategy::Random).enrich(Row::from_pairs([("timestamp", "not-a-date")]));
        assert_eq!(record.partition_key, "not-a-date");
    }

    #[test]
    fn test_random_ids_unique_even_for_identical_rows() {
        let e = enricher(IdStrategy::Random);
        let ids: HashSet<String> = (0..100)
            .map(|_| e.enrich(Row::from_pairs([("v", "same")])).id)
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_deterministic_ids_stable_across_enrichers() {
        let row = Row::from_pairs([("timestamp", "t1"), ("v", "1")]);
        let a = enricher(IdStrategy::Deterministic).for_blob("blob.csv").enrich(row.clone());
        let b = enricher(IdStrategy::Deterministic).for_blob("blob.csv").enrich(row.clone());
        let other = enricher(IdStrategy::Deterministic).for_blob("other.csv").enrich(row);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_document_overrides_reserved_columns() {
        let row = Row::from_pairs([("id", "row-id"), ("timestamp", "t1"), ("TimestampID", "x"), ("v", "9")]);
        let record = enricher(IdStrategy::Random).enrich(row);
        let doc = record.to_document("TimestampID");
        assert_eq!(doc["id"], Value::String(record.id.clone()));
        assert_eq!(doc["TimestampID"], "t1");
        assert_eq!(doc["timestamp"], "t1");
        assert_eq!(doc["v"], "9");
        assert_eq!(doc.as_object().unwrap().len(), 4);
    }
}
