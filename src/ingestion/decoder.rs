//! CSV Decoder - turns raw blob bytes into rows keyed by the header line

use crate::error::DecodeError;
use csv::{Reader, ReaderBuilder, StringRecord};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One decoded data line: column name to raw value, in header order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<String>,
    line: u64,
}

impl Row {
    /// Build a row from `(column, value)` pairs. Later duplicates of a column are ignored.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut seen = HashSet::new();
        for (k, v) in pairs {
            let k = k.into();
            if seen.insert(k.clone()) {
                columns.push(k);
                values.push(v.into());
            }
        }
        Self {
            columns: columns.into(),
            values,
            line: 0,
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// 1-based line number in the source blob (0 for rows not read from a blob)
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Decoder over one blob. The header is parsed eagerly; data rows are produced
/// lazily and every call to [`Decoder::rows`] starts again from the first data line.
pub struct Decoder<'a> {
    content: &'a [u8],
    columns: Arc<[String]>,
}

impl<'a> Decoder<'a> {
    pub fn new(content: &'a [u8]) -> Result<Self, DecodeError> {
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }

        let mut reader = Self::reader(content);
        let header = reader
            .headers()
            .map_err(|e| DecodeError::Header { reason: e.to_string() })?;
        let columns = Self::parse_header(header)?;

        Ok(Self {
            content,
            columns: columns.into(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fresh iterator over the data lines.
    pub fn rows(&self) -> Rows<'a> {
        Rows {
            reader: Self::reader(self.content),
            columns: Arc::clone(&self.columns),
            record: StringRecord::new(),
        }
    }

    /// Drain every row, separating accepted rows from rejected lines.
    pub fn decode_all(&self) -> Decoded {
        let start = Instant::now();
        let mut rows = Vec::new();
        let mut failures = Vec::new();

        for result in self.rows() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    debug!("Rejected CSV line: {}", e);
                    failures.push(e);
                }
            }
        }

        let parse_time = start.elapsed();
        info!(
            "CSV parsing completed: {} rows ({} rejected) in {:.2} seconds",
            rows.len(),
            failures.len(),
            parse_time.as_secs_f64()
        );

        Decoded {
            columns: self.columns.to_vec(),
            rows,
            failures,
            parse_time,
        }
    }

    fn reader(content: &[u8]) -> Reader<&[u8]> {
        ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content)
    }

    fn parse_header(header: &StringRecord) -> Result<Vec<String>, DecodeError> {
        if header.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(header.len());
        for (idx, name) in header.iter().enumerate() {
            let name = name.trim();
            if name.is_empty() {
                return Err(DecodeError::Header {
                    reason: format!("column {} has no name", idx + 1),
                });
            }
            if !seen.insert(name) {
                return Err(DecodeError::DuplicateColumn {
                    column: name.to_string(),
                });
            }
            columns.push(name.to_string());
        }
        Ok(columns)
    }
}

/// Lazy row sequence produced by [`Decoder::rows`].
pub struct Rows<'a> {
    reader: Reader<&'a [u8]>,
    columns: Arc<[String]>,
    record: StringRecord,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                if self.record.len() != self.columns.len() {
                    return Some(Err(DecodeError::FieldCount {
                        line,
                        expected: self.columns.len(),
                        found: self.record.len(),
                    }));
                }
                Some(Ok(Row {
                    columns: Arc::clone(&self.columns),
                    values: self.record.iter().map(str::to_string).collect(),
                    line,
                }))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                Some(Err(DecodeError::Malformed {
                    line,
                    reason: e.to_string(),
                }))
            }
        }
    }
}

/// Everything the decoder produced for one blob
#[derive(Debug)]
pub struct Decoded {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub failures: Vec<DecodeError>,
    pub parse_time: Duration,
}
