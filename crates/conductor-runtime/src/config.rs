//! Runtime configuration.

use serde::Deserialize;

/// Tuning knobs for a conductor instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ConductorConfig {
    /// Width of the duplicate-request window, in milliseconds.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Latency samples retained per rolling statistics distribution.
    #[serde(default = "default_stats_sample_cap")]
    pub stats_sample_cap: usize,
    /// Resources that reject conflicting requests instead of queueing them.
    #[serde(default)]
    pub strict_resources: Vec<String>,
}

fn default_dedup_window_ms() -> u64 {
    1_000
}

fn default_stats_sample_cap() -> usize {
    512
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: default_dedup_window_ms(),
            stats_sample_cap: default_stats_sample_cap(),
            strict_resources: Vec::new(),
        }
    }
}
