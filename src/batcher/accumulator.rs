//! Batch configuration and the in-loop accumulator.
//!
//! The accumulator owns the pending batch and the flush deadline. It is only
//! ever touched by the coordination loop, so it needs no locking.

use std::time::Duration;
use tokio::time::Instant;

use super::BatcherError;

/// Configuration for a batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of requests that triggers an immediate flush
    pub max_batch_size: usize,
    /// Maximum time a non-empty batch waits before it is flushed
    pub flush_period: Duration,
    /// Capacity of the inbound queue between producers and the loop
    pub queue_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            flush_period: Duration::from_secs(3),
            queue_capacity: 1000,
        }
    }
}

impl BatchConfig {
    /// Create a BatchConfig from application config values.
    pub fn from_config(batch_size: usize, flush_period_ms: u64, queue_capacity: usize) -> Self {
        Self {
            max_batch_size: batch_size,
            flush_period: Duration::from_millis(flush_period_ms),
            queue_capacity,
        }
    }

    /// Reject zero sizes and periods.
    pub fn validate(&self) -> Result<(), BatcherError> {
        if self.max_batch_size == 0 {
            return Err(BatcherError::InvalidConfig(
                "batch size must be at least 1".into(),
            ));
        }
        if self.flush_period.is_zero() {
            return Err(BatcherError::InvalidConfig(
                "flush period must be greater than zero".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(BatcherError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Pending batch plus the recurring flush deadline.
///
/// Flushes when either:
/// - The batch is full (max_batch_size)
/// - The deadline passes with at least one item buffered
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    config: BatchConfig,
    items: Vec<T>,
    deadline: Instant,
}

impl<T> BatchAccumulator<T> {
    /// Create an empty accumulator with the deadline armed one period out.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            items: Vec::with_capacity(config.max_batch_size),
            deadline: Instant::now() + config.flush_period,
        }
    }

    /// Add an item to the batch.
    ///
    /// Returns true if the batch is now full.
    pub fn push(&mut self, item: T) -> bool {
        self.items.push(item);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.config.max_batch_size
    }

    /// Instant at which the timer trigger fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Restart the full flush period from now.
    pub fn rearm(&mut self) {
        self.deadline = Instant::now() + self.config.flush_period;
    }

    /// Time remaining until the deadline.
    pub fn time_until_deadline(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Drain the batch, returning all accumulated items.
    ///
    /// Does not touch the deadline; the caller decides whether to rearm.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(
            &mut self.items,
            Vec::with_capacity(self.config.max_batch_size),
        )
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the current batch size.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}
