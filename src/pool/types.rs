use std::time::{Duration, Instant};

/// Pool configuration.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept warm.
    pub max_size: usize,

    /// Timeouts of the pool.
    pub timeouts: Timeouts,

    /// Queue mode of the pool.
    pub queue_mode: QueueMode,
}

impl PoolConfig {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            timeouts: Timeouts::default(),
            queue_mode: QueueMode::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(num_cpus::get_physical() * 4)
    }
}

/// Timeouts when getting objects from a pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct Timeouts {
    /// Timeout when waiting for a slot to become available.
    pub wait: Option<Duration>,

    /// Timeout when creating a new object.
    pub create: Option<Duration>,

    /// Timeout when recycling an object.
    pub recycle: Option<Duration>,
}

impl Timeouts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Mode for dequeuing objects from a pool.
#[derive(Clone, Copy, Debug)]
pub enum QueueMode {
    Fifo,
    Lifo,
}

impl Default for QueueMode {
    fn default() -> Self {
        Self::Fifo
    }
}

/// The current pool status.
#[derive(Clone, Copy, Debug)]
pub struct Status {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// Statistics regarding an object handed out by the pool.
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Metrics {
    pub created: Instant,
    pub recycled: Option<Instant>,
    pub recycle_count: usize,
}

impl Metrics {
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn last_used(&self) -> Duration {
        self.recycled.unwrap_or(self.created).elapsed()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            created: Instant::now(),
            recycled: None,
            recycle_count: 0,
        }
    }
}
