//! Timing knobs shared by the coordination services.

use std::time::Duration;

/// Backoff, lease and polling intervals used by the coordination services.
#[derive(Debug, Clone)]
pub struct CoordinationConfig {
    /// Sleep between failed lock acquisition attempts.
    pub lock_retry_interval: Duration,
    /// Budget for retrying conflicting optimistic transactions.
    pub optimistic_retry_budget: Duration,
    /// Sleep of the delayed-task poller when nothing is due.
    pub poll_interval: Duration,
    /// How long a poller tries for a per-task lock before moving on.
    pub promotion_lock_timeout: Duration,
    /// Lease on the per-task lock, so a crashed poller cannot pin a task.
    pub promotion_lock_lease: Duration,
    /// How long a sender waits for the channel lock.
    pub send_lock_timeout: Duration,
    /// Lease on the channel lock.
    pub send_lock_lease: Duration,
    /// How long a guarded fair acquire waits for the semaphore lock.
    pub guarded_semaphore_lock_timeout: Duration,
    /// Lease on the semaphore lock, so a crashed caller cannot wedge the
    /// guarded path.
    pub guarded_semaphore_lock_lease: Duration,
    /// How long a ready-queue worker blocks on an empty queue.
    pub worker_pop_timeout: Duration,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lock_retry_interval: Duration::from_millis(10),
            optimistic_retry_budget: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            promotion_lock_timeout: Duration::from_millis(10),
            promotion_lock_lease: Duration::from_secs(10),
            send_lock_timeout: Duration::from_secs(10),
            send_lock_lease: Duration::from_secs(10),
            guarded_semaphore_lock_timeout: Duration::from_millis(10),
            guarded_semaphore_lock_lease: Duration::from_secs(1),
            worker_pop_timeout: Duration::from_secs(1),
        }
    }
}

impl CoordinationConfig {
    /// Overrides the delayed-task poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Overrides the ready-queue pop timeout.
    #[must_use]
    pub fn with_worker_pop_timeout(mut self, worker_pop_timeout: Duration) -> Self {
        self.worker_pop_timeout = worker_pop_timeout;
        self
    }
}
