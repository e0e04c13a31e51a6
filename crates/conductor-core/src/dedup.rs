//! Duplicate-request detection over a sliding time window.
//!
//! Absorbs double-invocation races: two admissions with the same canonical
//! hash inside the window collapse to one execution.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default window width in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 1_000;

/// Sliding window of recently admitted request hashes.
///
/// Entries older than the window are dropped lazily when new hashes are
/// recorded, so an idle detector holds at most one window's worth of traffic.
pub struct DuplicationDetector {
    window: Duration,
    recent: Mutex<VecDeque<(u64, Instant)>>,
}

impl DuplicationDetector {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when the hash was recorded within the window.
    pub fn is_duplicate(&self, hash: u64) -> bool {
        let now = Instant::now();
        self.recent()
            .iter()
            .any(|(h, at)| *h == hash && now.duration_since(*at) <= self.window)
    }

    /// Record a hash at the current instant, evicting expired entries.
    pub fn record(&self, hash: u64) {
        let now = Instant::now();
        let mut recent = self.recent();
        while let Some((_, at)) = recent.front() {
            if now.duration_since(*at) > self.window {
                recent.pop_front();
            } else {
                break;
            }
        }
        recent.push_back((hash, now));
    }

    /// Number of hashes currently retained, expired entries included.
    pub fn len(&self) -> usize {
        self.recent().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent().is_empty()
    }

    fn recent(&self) -> MutexGuard<'_, VecDeque<(u64, Instant)>> {
        match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for DuplicationDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}
