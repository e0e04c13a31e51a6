//! Execution statistics: monotonic counters and rolling latency windows.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

const DEFAULT_SAMPLE_CAP: usize = 512;

/// Monotonic event counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsCounters {
    pub queued: u64,
    pub started: u64,
    pub completed: u64,
    pub errored: u64,
    pub cancelled: u64,
    pub duplicates: u64,
}

/// Summary of one rolling latency window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DistributionSnapshot {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Point-in-time view of all recorded statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub counters: StatsCounters,
    pub wait_time: DistributionSnapshot,
    pub run_time: DistributionSnapshot,
}

struct Rolling {
    samples: VecDeque<u64>,
    cap: usize,
}

impl Rolling {
    fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    fn record(&mut self, ms: u64) {
        if self.samples.len() >= self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    fn snapshot(&self) -> DistributionSnapshot {
        if self.samples.is_empty() {
            return DistributionSnapshot::default();
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let pick = |p: f64| {
            let index = ((sorted.len() - 1) as f64 * p).round() as usize;
            sorted[index.min(sorted.len() - 1)]
        };
        DistributionSnapshot {
            count: sorted.len(),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            p50_ms: pick(0.50),
            p95_ms: pick(0.95),
            p99_ms: pick(0.99),
        }
    }
}

struct StatsInner {
    counters: StatsCounters,
    wait: Rolling,
    run: Rolling,
}

/// Thread-safe statistics recorder shared across the runtime.
pub struct StatisticsManager {
    inner: Mutex<StatsInner>,
}

impl StatisticsManager {
    pub fn new() -> Self {
        Self::with_sample_cap(DEFAULT_SAMPLE_CAP)
    }

    /// Create a manager retaining at most `cap` samples per distribution.
    pub fn with_sample_cap(cap: usize) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                counters: StatsCounters::default(),
                wait: Rolling::new(cap),
                run: Rolling::new(cap),
            }),
        }
    }

    pub fn record_queued(&self) {
        self.lock().counters.queued += 1;
    }

    pub fn record_started(&self) {
        self.lock().counters.started += 1;
    }

    pub fn record_completed(&self, runtime: Duration) {
        let mut inner = self.lock();
        inner.counters.completed += 1;
        inner.run.record(runtime.as_millis() as u64);
    }

    pub fn record_error(&self) {
        self.lock().counters.errored += 1;
    }

    pub fn record_cancelled(&self) {
        self.lock().counters.cancelled += 1;
    }

    pub fn record_duplicate(&self) {
        self.lock().counters.duplicates += 1;
    }

    pub fn record_wait_time(&self, wait: Duration) {
        self.lock().wait.record(wait.as_millis() as u64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();
        StatsSnapshot {
            counters: inner.counters,
            wait_time: inner.wait.snapshot(),
            run_time: inner.run.snapshot(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for StatisticsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = StatisticsManager::new();
        stats.record_queued();
        stats.record_queued();
        stats.record_started();
        stats.record_completed(Duration::from_millis(12));
        stats.record_error();
        stats.record_cancelled();
        stats.record_duplicate();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.counters.queued, 2);
        assert_eq!(snapshot.counters.started, 1);
        assert_eq!(snapshot.counters.completed, 1);
        assert_eq!(snapshot.counters.errored, 1);
        assert_eq!(snapshot.counters.cancelled, 1);
        assert_eq!(snapshot.counters.duplicates, 1);
    }

    #[test]
    fn test_distribution_percentiles() {
        let stats = StatisticsManager::new();
        for ms in 1..=100u64 {
            stats.record_wait_time(Duration::from_millis(ms));
        }

        let wait = stats.snapshot().wait_time;
        assert_eq!(wait.count, 100);
        assert_eq!(wait.min_ms, 1);
        assert_eq!(wait.max_ms, 100);
        assert_eq!(wait.p50_ms, 51);
        assert_eq!(wait.p95_ms, 95);
        assert_eq!(wait.p99_ms, 99);
    }

    #[test]
    fn test_rolling_window_evicts_oldest_samples() {
        let stats = StatisticsManager::with_sample_cap(3);
        for ms in [10u64, 20, 30, 40] {
            stats.record_completed(Duration::from_millis(ms));
        }

        let run = stats.snapshot().run_time;
        assert_eq!(run.count, 3);
        assert_eq!(run.min_ms, 20);
        assert_eq!(run.max_ms, 40);
    }

    #[test]
    fn test_empty_distribution_snapshot_is_zeroed() {
        let snapshot = StatisticsManager::new().snapshot();
        assert_eq!(snapshot.wait_time.count, 0);
        assert_eq!(snapshot.run_time.max_ms, 0);
    }
}
