//! Result Accumulator - folds per-batch outcomes into the run's IngestionResult

use crate::error::WriteError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-record write result
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    Failure(WriteError),
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Success)
    }
}

/// All record outcomes of one completed batch
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    /// 1-based batch number
    pub index: usize,
    pub outcomes: Vec<WriteOutcome>,
    pub elapsed: Duration,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.successful()
    }

    pub fn failures(&self) -> impl Iterator<Item = &WriteError> {
        self.outcomes.iter().filter_map(|o| match o {
            WriteOutcome::Failure(e) => Some(e),
            WriteOutcome::Success => None,
        })
    }

    /// Every record failed because the store was unreachable
    pub fn is_total_outage(&self) -> bool {
        !self.is_empty() && self.outcomes.iter().all(|o| match o {
            WriteOutcome::Failure(e) => e.is_outage(),
            WriteOutcome::Success => false,
        })
    }
}

/// Aggregate result of one ingestion run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionResult {
    /// Records submitted to the batch writer
    pub total_rows: usize,
    pub successful: usize,
    pub failed: usize,
    /// Batches fully processed
    pub batches: usize,
    /// Failure counts by write error kind
    pub failures_by_kind: BTreeMap<String, usize>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub rows_per_second: f64,
}

impl IngestionResult {
    /// Records with a known outcome so far
    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }

    /// Whether every submitted record has an outcome
    pub fn is_complete(&self) -> bool {
        self.processed() == self.total_rows
    }
}

/// Running fold over batch outcomes.
///
/// `merge` is associative and commutative, so batches completing in any order
/// produce the same final counts.
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    result: IngestionResult,
}

impl Accumulator {
    pub fn new(total_rows: usize) -> Self {
        Self {
            result: IngestionResult {
                total_rows,
                ..IngestionResult::default()
            },
        }
    }

    pub fn record_batch(&mut self, batch: &BatchOutcome) {
        let successful = batch.successful();
        self.result.successful += successful;
        self.result.failed += batch.len() - successful;
        self.result.batches += 1;
        for e in batch.failures() {
            *self
                .result
                .failures_by_kind
                .entry(e.kind().to_string())
                .or_insert(0) += 1;
        }
    }

    /// Combine two partial folds over disjoint batch sets of the same run
    pub fn merge(mut self, other: Accumulator) -> Accumulator {
        self.result.total_rows = self.result.total_rows.max(other.result.total_rows);
        self.result.successful += other.result.successful;
        self.result.failed += other.result.failed;
        self.result.batches += other.result.batches;
        for (kind, n) in other.result.failures_by_kind {
            *self.result.failures_by_kind.entry(kind).or_insert(0) += n;
        }
        self
    }

    pub fn processed(&self) -> usize {
        self.result.processed()
    }

    pub fn current(&self) -> &IngestionResult {
        &self.result
    }

    /// Cumulative share of submitted records processed, capped at 100
    pub fn percent_complete(&self) -> f64 {
        if self.result.total_rows == 0 {
            return 100.0;
        }
        (self.processed() as f64 / self.result.total_rows as f64 * 100.0).min(100.0)
    }

    pub fn finish(self, elapsed: Duration) -> IngestionResult {
        let mut result = self.result;
        result.elapsed = elapsed;
        // Aborted runs only account for the records that reached the store.
        result.rows_per_second = throughput(result.processed(), elapsed);
        result
    }
}

/// Rows per second; zero when no time elapsed
pub fn throughput(rows: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        rows as f64 / secs
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(index: usize, pattern: &[bool]) -> BatchOutcome {
        BatchOutcome {
            index,
            outcomes: pattern
                .iter()
                .map(|ok| {
                    if *ok {
                        WriteOutcome::Success
                    } else {
                        WriteOutcome::Failure(WriteError::Conflict("dup".to_string()))
                    }
                })
                .collect(),
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_counts_add_up() {
        let mut acc = Accumulator::new(7);
        acc.record_batch(&batch(1, &[true, false, true]));
        acc.record_batch(&batch(2, &[true, false, true]));
        acc.record_batch(&batch(3, &[true]));
        let result = acc.finish(Duration::from_secs(2));

        assert_eq!(result.successful, 5);
        assert_eq!(result.failed, 2);
        assert_eq!(result.batches, 3);
        assert!(result.is_complete());
        assert_eq!(result.failures_by_kind.get("conflict"), Some(&2));
        assert!((result.rows_per_second - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_throughput_of_aborted_run_uses_processed_records() {
        let mut acc = Accumulator::new(9);
        acc.record_batch(&batch(1, &[true, true, true]));
        acc.record_batch(&batch(2, &[false, false, false]));
        let result = acc.finish(Duration::from_secs(2));

        assert!(!result.is_complete());
        assert!((result.rows_per_second - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_elapsed_gives_zero_throughput() {
        let result = Accumulator::new(10).finish(Duration::ZERO);
        assert_eq!(result.rows_per_second, 0.0);
        assert_eq!(throughput(0, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let b1 = batch(1, &[true, false]);
        let b2 = batch(2, &[false, false, true]);
        let b3 = batch(3, &[true]);

        let mut left = Accumulator::new(6);
        left.record_batch(&b1);
        let mut right = Accumulator::new(6);
        right.record_batch(&b3);
        right.record_batch(&b2);

        let mut sequential = Accumulator::new(6);
        for b in [&b1, &b2, &b3] {
            sequential.record_batch(b);
        }

        let merged = right.merge(left).finish(Duration::from_secs(1));
        assert_eq!(merged, sequential.finish(Duration::from_secs(1)));
    }

    #[test]
    fn test_percent_complete_capped() {
        let mut acc = Accumulator::new(2);
        assert_eq!(acc.percent_complete(), 0.0);
        acc.record_batch(&batch(1, &[true, true]));
        assert_eq!(acc.percent_complete(), 100.0);
        assert_eq!(Accumulator::new(0).percent_complete(), 100.0);
    }

    #[test]
    fn test_total_outage_detection() {
        let outage = BatchOutcome {
            index: 1,
            outcomes: vec![
                WriteOutcome::Failure(WriteError::Unavailable("down".to_string())),
                WriteOutcome::Failure(WriteError::Unavailable("down".to_string())),
            ],
            elapsed: Duration::ZERO,
        };
        assert!(outage.is_total_outage());
        assert!(!batch(1, &[false]).is_total_outage());
    }

    #[test]
    fn test_result_serializes_elapsed_as_seconds() {
        let result = Accumulator::new(1).finish(Duration::from_millis(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["elapsed"], 1.5);
    }
}
