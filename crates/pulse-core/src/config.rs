use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the monitor engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between sweeps, measured from the end of one sweep to the
    /// start of the next (default: 7000 ms).
    pub poll_interval: Duration,
    /// Span of the sliding window used for recent-issue counts
    /// (default: 12 minutes).
    pub window_span: Duration,
    /// Default staleness threshold for newly created stream records;
    /// each record carries its own copy (default: 7000 ms).
    pub stale_threshold: Duration,
    /// Maximum concurrent media-analysis jobs, process-wide (default: 4).
    pub max_concurrent_jobs: usize,
    /// Ledger entries older than this are dropped on persist (default: 7 days).
    pub error_retention: Duration,
    /// HTTP request timeout for manifest fetches (default: 10 s).
    pub fetch_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(7000),
            window_span: Duration::from_secs(12 * 60),
            stale_threshold: Duration::from_millis(7000),
            max_concurrent_jobs: 4,
            error_retention: Duration::from_secs(7 * 24 * 3600),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl MonitorConfig {
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval = Duration::from_millis(ms);
        self
    }

    pub fn with_window_span(mut self, ms: u64) -> Self {
        self.window_span = Duration::from_millis(ms);
        self
    }

    pub fn with_stale_threshold(mut self, ms: u64) -> Self {
        self.stale_threshold = Duration::from_millis(ms);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs.max(1);
        self
    }

    pub fn with_error_retention(mut self, retention: Duration) -> Self {
        self.error_retention = retention;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}
