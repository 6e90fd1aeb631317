use serde::Serialize;
use thiserror::Error;

use crate::ingestion::accumulator::IngestionResult;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Rejection raised while turning blob bytes into rows.
///
/// Header-level variants abort the run; line-level variants skip the line.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    #[error("input is empty")]
    Empty,

    #[error("header could not be parsed: {reason}")]
    Header { reason: String },

    #[error("duplicate column name '{column}' in header")]
    DuplicateColumn { column: String },

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

impl DecodeError {
    /// Whether this error aborts the whole run rather than a single line.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::Empty | DecodeError::Header { .. } | DecodeError::DuplicateColumn { .. }
        )
    }
}

/// Per-record failure reported by a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl WriteError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WriteError::Throttled(_) | WriteError::Timeout(_) | WriteError::Unavailable(_)
        )
    }

    /// Failures that indicate the store is down for every subsequent write.
    pub fn is_outage(&self) -> bool {
        matches!(self, WriteError::Unavailable(_))
    }

    /// Short label used in logs and failure breakdowns.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteError::Conflict(_) => "conflict",
            WriteError::Throttled(_) => "throttled",
            WriteError::Rejected(_) => "rejected",
            WriteError::Timeout(_) => "timeout",
            WriteError::Unavailable(_) => "unavailable",
            WriteError::Other(_) => "other",
        }
    }
}

/// A fatal error together with whatever the run accomplished before it.
#[derive(Error, Debug)]
#[error("ingestion aborted after {} of {} records: {error}", .partial.processed(), .partial.total_rows)]
pub struct RunFailure {
    #[source]
    pub error: IngestError,
    pub partial: IngestionResult,
}

impl RunFailure {
    pub fn new(error: IngestError, partial: IngestionResult) -> Self {
        Self { error, partial }
    }

    /// Failure before any record reached the writer.
    pub fn before_write(error: IngestError) -> Self {
        Self::new(error, IngestionResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_fatality() {
        assert!(DecodeError::Empty.is_fatal());
        assert!(DecodeError::DuplicateColumn { column: "a".to_string() }.is_fatal());
        assert!(!DecodeError::FieldCount { line: 3, expected: 2, found: 1 }.is_fatal());
    }

    #[test]
    fn test_write_error_classification() {
        assert!(WriteError::Throttled("429".into()).is_retryable());
        assert!(WriteError::Unavailable("dns".into()).is_outage());
        assert!(!WriteError::Conflict("409".into()).is_retryable());
        assert_eq!(WriteError::Rejected("bad".into()).kind(), "rejected");
    }
}
