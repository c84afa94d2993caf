use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY_BYTES;

/// Default depth of the dispatcher's command channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Workers silent for longer than this are reported as not alive.
pub const DEFAULT_WORKER_STALE_AFTER: Duration = Duration::from_secs(60);

/// Tunables for a dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on the total weight of cached job snapshots.
    pub cache_capacity_bytes: usize,
    /// Commands that may be buffered before senders wait.
    pub channel_capacity: usize,
    /// How long a synchronous submit waits for its job before giving up.
    /// `None` waits forever.
    pub wait_timeout: Option<Duration>,
    pub worker_stale_after: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: DEFAULT_CAPACITY_BYTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            wait_timeout: None,
            worker_stale_after: DEFAULT_WORKER_STALE_AFTER,
        }
    }
}

impl DispatcherConfig {
    pub fn with_cache_capacity_bytes(mut self, bytes: usize) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }
}
