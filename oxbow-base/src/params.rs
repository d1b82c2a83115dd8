use serde::{Deserialize, Serialize};

// Process-wide tunables. One instance is built at boot (defaults, then an
// optional config file, then per-field setters in tests) and shared read-only
// from then on; nothing here is hot enough to justify live reloading.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemParams {
    /// Number of request worker threads.
    pub workers: usize,
    /// Checkpoint daemon period, in minutes.
    pub checkpoint_interval_min: u64,
    /// Group-commit coalescing window, in milliseconds. Zero disables
    /// group commit.
    pub group_commit_interval_ms: u64,
    /// Background log flush period, in milliseconds. Zero disables
    /// background flushing.
    pub log_bg_flush_interval_ms: u64,
    /// Log header flush period when replicating, in seconds.
    pub log_header_flush_interval_s: u64,
    /// Whether commit waiters are released before their flush completes.
    pub async_commit: bool,
    /// Whether a replica consumes this server's log.
    pub replication_mode: bool,
    /// Deadlock scan pacing, in milliseconds.
    pub deadlock_scan_interval_ms: u64,
    /// How long a maintenance transition waits for ordinary clients to
    /// disconnect before slamming them, in seconds.
    pub maintenance_timeout_s: u64,
    /// Worker-drain retries before shutdown gives up and exits the process.
    pub shutdown_worker_retries: u32,
    /// Daemon-drain retries before shutdown gives up and exits the process.
    pub shutdown_daemon_retries: u32,
    /// Passes over a connection's pending requests before the drain path
    /// concludes something is stuck.
    pub pending_request_retries: u32,
    /// Capacity of the outbound method-callout pool.
    pub method_pool_size: usize,
    /// Log every dispatched request name at debug level.
    pub track_requests: bool,
    /// Coercion failures inside functions yield NULL instead of an error.
    pub null_on_function_errors: bool,
}

impl Default for SystemParams {
    fn default() -> Self {
        SystemParams {
            workers: 10,
            checkpoint_interval_min: 60,
            group_commit_interval_ms: 0,
            log_bg_flush_interval_ms: 1000,
            log_header_flush_interval_s: 5,
            async_commit: false,
            replication_mode: false,
            deadlock_scan_interval_ms: 500,
            maintenance_timeout_s: 60,
            shutdown_worker_retries: 60,
            shutdown_daemon_retries: 30,
            pending_request_retries: 10,
            method_pool_size: 10,
            track_requests: false,
            null_on_function_errors: false,
        }
    }
}

impl SystemParams {
    /// Effective log-flush timer: min of the group-commit and background
    /// intervals, treating zero as "off". Returns zero only when both are
    /// off, in which case the flush daemon waits for explicit signals.
    pub fn log_flush_wait_ms(&self) -> u64 {
        let gc = if self.group_commit_interval_ms == 0 {
            u64::MAX
        } else {
            self.group_commit_interval_ms
        };
        let bg = if self.log_bg_flush_interval_ms == 0 {
            u64::MAX
        } else {
            self.log_bg_flush_interval_ms
        };
        let min = gc.min(bg);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    pub fn group_commit_active(&self) -> bool {
        self.group_commit_interval_ms > 0
    }
}
