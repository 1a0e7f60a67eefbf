use std::time::Duration;

/// Tunables for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of workers created at start.
    pub worker_pool_size: usize,
    /// Capacity of the admission queue.
    pub queue_size: usize,
    /// Timeout ceiling inherited by tasks without an explicit timeout.
    pub task_timeout: Duration,
    /// How long admission waits for queue space before failing `QUEUE_FULL`.
    pub admission_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 5,
            queue_size: 100,
            task_timeout: Duration::from_secs(30 * 60),
            admission_wait: Duration::from_secs(5),
        }
    }
}
