//! Batch latency and throughput tracking for scoring runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for one predictor (one slice worker)
pub struct ScoringMetrics {
    /// Records run through the model
    records_scored: AtomicU64,
    /// Input lines skipped as malformed
    lines_skipped: AtomicU64,
    /// Batch execution times (in microseconds)
    batch_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            records_scored: AtomicU64::new(0),
            lines_skipped: AtomicU64::new(0),
            batch_times: RwLock::new(Vec::with_capacity(1024)),
            start_time: Instant::now(),
        }
    }

    /// Record an executed batch
    pub fn record_batch(&self, elapsed: Duration, rows: usize) {
        self.records_scored.fetch_add(rows as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.batch_times.write() {
            times.push(elapsed.as_micros() as u64);
            // Keep only the most recent batches
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    pub fn record_skipped(&self) {
        self.lines_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records(&self) -> u64 {
        self.records_scored.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.lines_skipped.load(Ordering::Relaxed)
    }

    pub fn get_batch_stats(&self) -> BatchStats {
        let times = match self.batch_times.read() {
            Ok(times) => times,
            Err(poisoned) => poisoned.into_inner(),
        };
        if times.is_empty() {
            return BatchStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        BatchStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    /// Records per second since creation
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_summary(&self, slice_id: usize) {
        let stats = self.get_batch_stats();
        info!(
            slice_id = slice_id,
            records = self.records(),
            skipped = self.skipped(),
            batches = stats.count,
            batch_mean_us = stats.mean_us,
            batch_p50_us = stats.p50_us,
            batch_p99_us = stats.p99_us,
            batch_max_us = stats.max_us,
            throughput = format!("{:.1} rec/s", self.get_throughput()),
            "Scoring summary"
        );
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScoringMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringMetrics")
            .field("records_scored", &self.records())
            .field("lines_skipped", &self.skipped())
            .finish()
    }
}

/// Batch execution time statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
