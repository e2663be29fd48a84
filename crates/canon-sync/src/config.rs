//! Block pool tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request and scheduling policy of the block pool.
///
/// The retry constants are policy, not protocol: any values work as long as
/// `source_retry_limit <= max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Outstanding requests allowed per active peer
    pub window_per_peer: usize,
    /// How long a request may stay unanswered, in milliseconds
    pub request_timeout_ms: u64,
    /// Attempts made against the announcing peer before asking others
    pub source_retry_limit: u32,
    /// Attempts after which a hash is abandoned
    pub max_attempts: u32,
    /// Period of the request distribution task, in milliseconds
    pub distribute_interval_ms: u64,
    /// Period of the chain assembly task, in milliseconds
    pub sync_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_per_peer: 256,
            request_timeout_ms: 5_000,
            source_retry_limit: 3,
            max_attempts: 8,
            distribute_interval_ms: 100,
            sync_interval_ms: 500,
        }
    }
}

impl SyncConfig {
    /// Set the per-peer request window
    pub fn with_window_per_peer(mut self, window: usize) -> Self {
        self.window_per_peer = window;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the source retry limit
    pub fn with_source_retry_limit(mut self, limit: u32) -> Self {
        self.source_retry_limit = limit;
        self
    }

    /// Set the attempt ceiling
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set both task periods
    pub fn with_intervals(mut self, distribute: Duration, sync: Duration) -> Self {
        self.distribute_interval_ms = distribute.as_millis() as u64;
        self.sync_interval_ms = sync.as_millis() as u64;
        self
    }

    /// Request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Distribution task period
    pub fn distribute_interval(&self) -> Duration {
        Duration::from_millis(self.distribute_interval_ms.max(1))
    }

    /// Assembly task period
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }
}
