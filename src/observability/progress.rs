//! Batch Progress
//!
//! Observers receive one event per completed batch. `TracingProgress` writes the
//! progress line to the log; `ProgressLog` keeps recent events in memory and can
//! append them as JSON lines to a file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Progress event emitted after a batch completes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchProgress {
    pub timestamp: DateTime<Utc>,
    /// 1-based batch number
    pub batch_index: usize,
    pub batch_size: usize,
    pub successful: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    /// Records with a known outcome across the run so far
    pub cumulative_processed: usize,
    pub cumulative_successful: usize,
    pub total_rows: usize,
    pub percent_complete: f64,
}

impl BatchProgress {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

pub trait ProgressObserver: Send + Sync {
    fn on_batch(&self, progress: &BatchProgress);
}

/// Logs each batch at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_batch(&self, p: &BatchProgress) {
        info!(
            "Batch {}: {} successful, {} failed. Progress: {:.1}% ({}/{}). Batch time: {:.2}s",
            p.batch_index,
            p.successful,
            p.failed,
            p.percent_complete,
            p.cumulative_successful,
            p.total_rows,
            p.elapsed().as_secs_f64()
        );
    }
}

/// In-memory progress history, optionally mirrored to a JSON-lines file
pub struct ProgressLog {
    log_file: Option<PathBuf>,
    events: Arc<Mutex<Vec<BatchProgress>>>,
    max_in_memory: usize,
}

impl ProgressLog {
    pub fn new(log_file: Option<PathBuf>, max_in_memory: usize) -> Self {
        Self {
            log_file,
            events: Arc::new(Mutex::new(Vec::new())),
            max_in_memory,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None, usize::MAX)
    }

    pub fn events(&self) -> Vec<BatchProgress> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn write_event(&self, event: &BatchProgress) -> std::io::Result<()> {
        if let Some(ref log_file) = self.log_file {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            let json = serde_json::to_string(event)?;
            writeln!(file, "{}", json)?;
        }
        Ok(())
    }
}

impl ProgressObserver for ProgressLog {
    fn on_batch(&self, progress: &BatchProgress) {
        if let Ok(mut events) = self.events.lock() {
            events.push(progress.clone());
            if events.len() > self.max_in_memory {
                events.remove(0);
            }
        }

        if let Err(e) = self.write_event(progress) {
            warn!("Failed to write progress log: {}", e);
        }
    }
}

/// Fans one event out to several observers
pub struct ProgressFanout {
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl ProgressFanout {
    pub fn new(observers: Vec<Arc<dyn ProgressObserver>>) -> Self {
        Self { observers }
    }
}

impl ProgressObserver for ProgressFanout {
    fn on_batch(&self, progress: &BatchProgress) {
        for observer in &self.observers {
            observer.on_batch(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(index: usize) -> BatchProgress {
        BatchProgress {
            timestamp: Utc::now(),
            batch_index: index,
            batch_size: 10,
            successful: 9,
            failed: 1,
            elapsed_ms: 12,
            cumulative_processed: index * 10,
            cumulative_successful: index * 9,
            total_rows: 30,
            percent_complete: index as f64 * 100.0 / 3.0,
        }
    }

    #[test]
    fn test_progress_log_bounds_memory() {
        let log = ProgressLog::new(None, 2);
        for i in 1..=3 {
            log.on_batch(&event(i));
        }
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].batch_index, 2);
    }

    #[test]
    fn test_progress_log_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let log = ProgressLog::new(Some(path.clone()), 10);
        log.on_batch(&event(1));
        log.on_batch(&event(2));

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<BatchProgress> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].batch_index, 2);
    }

    #[test]
    fn test_fanout_reaches_every_observer() {
        let a = Arc::new(ProgressLog::in_memory());
        let b = Arc::new(ProgressLog::in_memory());
        let observers: Vec<Arc<dyn ProgressObserver>> =
            vec![a.clone(), b.clone(), Arc::new(TracingProgress)];
        let fanout = ProgressFanout::new(observers);
        fanout.on_batch(&event(1));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
