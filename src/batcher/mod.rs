//! Size-or-time write batcher.
//!
//! Producers call [`Batcher::submit`]; one coordination task gathers requests
//! and hands them to the [`Store`] as atomic batches:
//! - When the batch reaches `max_batch_size` (which also restarts the timer)
//! - When `flush_period` elapses with a non-empty batch
//! - Once more on [`Batcher::stop`], after draining the queue

pub mod accumulator;
pub mod state;
mod worker;

pub use accumulator::{BatchAccumulator, BatchConfig};
pub use state::BatcherState;

use serde::Serialize;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::notify::{FlushEvent, FlushNotifier};
use crate::observability::metrics::record_submit_rejected;
use crate::storage::{Store, WriteRequest};
use state::Lifecycle;
use worker::{FlushCounters, LoopReport, Worker};

/// Error type for batcher operations.
#[derive(Debug, Error)]
pub enum BatcherError {
    #[error("write queue is full")]
    QueueFull,

    #[error("batcher is not running")]
    NotRunning,

    #[error("batcher was already started")]
    AlreadyStarted,

    #[error("no tokio runtime to run the coordination loop on")]
    NoRuntime,

    #[error("invalid batcher configuration: {0}")]
    InvalidConfig(String),

    #[error("{failed_batches} flush(es) failed, {dropped_writes} write(s) dropped: {last_error}")]
    FlushFailed {
        failed_batches: u64,
        dropped_writes: u64,
        last_error: String,
    },

    #[error("coordination loop panicked")]
    LoopPanicked,
}

/// Counters kept by the coordination loop.
///
/// Only published once the loop has exited, see [`Batcher::stats`]. If the
/// loop dies, the snapshot holds every flush it finished before that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    /// Batches the store accepted
    pub batch_count: u64,
    /// Writes contained in accepted batches
    pub total_writes: u64,
    /// Batches the store rejected
    pub failed_batches: u64,
    /// Writes contained in rejected batches
    pub dropped_writes: u64,
}

/// Bounded write batcher in front of a [`Store`].
///
/// Queue-full policy: [`submit`](Self::submit) waits for space,
/// [`try_submit`](Self::try_submit) fails with [`BatcherError::QueueFull`].
pub struct Batcher {
    config: BatchConfig,
    store: Arc<dyn Store>,
    lifecycle: Lifecycle,
    sender: mpsc::Sender<WriteRequest>,
    receiver: Mutex<Option<mpsc::Receiver<WriteRequest>>>,
    shutdown: CancellationToken,
    notifier: FlushNotifier,
    /// Coordination task; also serializes start/stop
    worker: tokio::sync::Mutex<Option<JoinHandle<LoopReport>>>,
    counters: Arc<FlushCounters>,
    stats: OnceLock<BatcherStats>,
}

impl Batcher {
    /// Create a batcher in the `Created` state.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::InvalidConfig`] for a zero batch size,
    /// flush period, or queue capacity.
    pub fn new(store: Arc<dyn Store>, config: BatchConfig) -> Result<Self, BatcherError> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        Ok(Self {
            config,
            store,
            lifecycle: Lifecycle::new(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            shutdown: CancellationToken::new(),
            notifier: FlushNotifier::default(),
            worker: tokio::sync::Mutex::new(None),
            counters: Arc::new(FlushCounters::default()),
            stats: OnceLock::new(),
        })
    }

    /// Spawn the coordination loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::AlreadyStarted`] unless the batcher is in the
    /// `Created` state, and [`BatcherError::NoRuntime`] when called outside a
    /// tokio runtime. A failed start leaves the batcher untouched.
    pub fn start(&self) -> Result<(), BatcherError> {
        let mut worker = self
            .worker
            .try_lock()
            .map_err(|_| BatcherError::AlreadyStarted)?;

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| BatcherError::NoRuntime)?;

        self.lifecycle
            .transition(BatcherState::Created, BatcherState::Running)
            .map_err(|_| BatcherError::AlreadyStarted)?;

        let receiver = self
            .receiver
            .lock()
            .ok()
            .and_then(|mut rx| rx.take())
            .ok_or(BatcherError::AlreadyStarted)?;

        let loop_worker = Worker::new(
            self.config,
            Arc::clone(&self.store),
            self.notifier.clone(),
            Arc::clone(&self.counters),
        );
        *worker = Some(runtime.spawn(loop_worker.run(receiver, self.shutdown.clone())));

        tracing::info!(
            max_batch_size = self.config.max_batch_size,
            flush_period_ms = self.config.flush_period.as_millis() as u64,
            queue_capacity = self.config.queue_capacity,
            "Batcher started"
        );
        Ok(())
    }

    /// Enqueue a request, waiting for queue space if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::NotRunning`] before `start` or once `stop`
    /// has begun. A rejected request is never enqueued.
    pub async fn submit(&self, request: WriteRequest) -> Result<(), BatcherError> {
        self.ensure_running()?;
        self.sender.send(request).await.map_err(|_| {
            record_submit_rejected("not_running");
            BatcherError::NotRunning
        })
    }

    /// Enqueue a request without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::QueueFull`] when the queue is saturated, and
    /// [`BatcherError::NotRunning`] as for [`submit`](Self::submit).
    pub fn try_submit(&self, request: WriteRequest) -> Result<(), BatcherError> {
        self.ensure_running()?;
        self.sender.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => {
                record_submit_rejected("queue_full");
                BatcherError::QueueFull
            }
            TrySendError::Closed(_) => {
                record_submit_rejected("not_running");
                BatcherError::NotRunning
            }
        })
    }

    /// Shut down gracefully.
    ///
    /// Rejects new submits, waits for the loop to drain the queue and flush
    /// the final batch, then returns the final counters. Calling `stop` again
    /// afterwards returns the same counters immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::FlushFailed`] if any batch was rejected by the
    /// store during the batcher's lifetime, and
    /// [`BatcherError::LoopPanicked`] if the loop did not exit cleanly.
    /// Counters remain readable through [`stats`](Self::stats) either way;
    /// after a panic they cover the flushes completed before it.
    pub async fn stop(&self) -> Result<BatcherStats, BatcherError> {
        let mut worker = self.worker.lock().await;

        match self.lifecycle.load() {
            BatcherState::Stopped => {
                return Ok(self.stats.get().copied().unwrap_or_default());
            }
            BatcherState::Created => {
                self.lifecycle.set(BatcherState::Stopped);
                self.shutdown.cancel();
                let stats = *self.stats.get_or_init(BatcherStats::default);
                tracing::info!("Batcher stopped before it was started");
                return Ok(stats);
            }
            BatcherState::Running | BatcherState::Draining => {}
        }

        self.lifecycle.set(BatcherState::Draining);
        tracing::info!(queued = self.queued(), "Stopping batcher, draining pending writes");
        self.shutdown.cancel();

        // Await through the reference so a cancelled stop() can be retried
        let joined = match worker.as_mut() {
            Some(handle) => handle.await,
            None => Ok(LoopReport::default()),
        };
        *worker = None;
        self.lifecycle.set(BatcherState::Stopped);

        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                let stats = *self.stats.get_or_init(|| self.counters.snapshot());
                tracing::error!(
                    error = %e,
                    batch_count = stats.batch_count,
                    total_writes = stats.total_writes,
                    "Coordination loop panicked"
                );
                return Err(BatcherError::LoopPanicked);
            }
        };

        let stats = *self.stats.get_or_init(|| report.stats);
        tracing::info!(
            batch_count = stats.batch_count,
            total_writes = stats.total_writes,
            failed_batches = stats.failed_batches,
            dropped_writes = stats.dropped_writes,
            "Batcher stopped"
        );

        if stats.failed_batches > 0 {
            return Err(BatcherError::FlushFailed {
                failed_batches: stats.failed_batches,
                dropped_writes: stats.dropped_writes,
                last_error: report.last_error.unwrap_or_default(),
            });
        }
        Ok(stats)
    }

    /// Final counters, available once [`stop`](Self::stop) has completed.
    pub fn stats(&self) -> Option<BatcherStats> {
        self.stats.get().copied()
    }

    pub fn state(&self) -> BatcherState {
        self.lifecycle.load()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Number of requests waiting in the queue (not yet in a batch).
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Receive a [`FlushEvent`] for every flush from now on.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlushEvent> {
        self.notifier.subscribe()
    }

    /// Flush events as a `Stream`.
    pub fn flush_events(&self) -> BroadcastStream<FlushEvent> {
        self.notifier.stream()
    }

    fn ensure_running(&self) -> Result<(), BatcherError> {
        if self.lifecycle.load().accepts_writes() {
            Ok(())
        } else {
            record_submit_rejected("not_running");
            Err(BatcherError::NotRunning)
        }
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        // The detached loop still drains and flushes before exiting
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("config", &self.config)
            .field("state", &self.lifecycle.load())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}
