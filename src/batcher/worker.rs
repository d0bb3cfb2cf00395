//! The coordination loop.
//!
//! A single task owns the pending batch, the flush deadline, and the
//! counters. Each iteration handles exactly one wake reason: shutdown,
//! deadline expiry, or a newly arrived request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;

use super::accumulator::{BatchAccumulator, BatchConfig};
use super::BatcherStats;
use crate::generate_batch_id;
use crate::notify::{FlushEvent, FlushNotifier, FlushOutcome, FlushTrigger};
use crate::observability::metrics::{record_flush, record_flush_failure};
use crate::storage::{Store, StoreError, WriteRequest};

/// Flush counters.
///
/// Written only by the coordination loop. Shared with the [`Batcher`](super::Batcher)
/// so the counts survive a loop that never returns its report.
#[derive(Debug, Default)]
pub(crate) struct FlushCounters {
    batch_count: AtomicU64,
    total_writes: AtomicU64,
    failed_batches: AtomicU64,
    dropped_writes: AtomicU64,
}

impl FlushCounters {
    fn record_applied(&self, len: usize) {
        self.batch_count.fetch_add(1, Ordering::Release);
        self.total_writes.fetch_add(len as u64, Ordering::Release);
    }

    fn record_dropped(&self, len: usize) {
        self.failed_batches.fetch_add(1, Ordering::Release);
        self.dropped_writes.fetch_add(len as u64, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            batch_count: self.batch_count.load(Ordering::Acquire),
            total_writes: self.total_writes.load(Ordering::Acquire),
            failed_batches: self.failed_batches.load(Ordering::Acquire),
            dropped_writes: self.dropped_writes.load(Ordering::Acquire),
        }
    }
}

/// What the loop hands back when it exits.
#[derive(Debug, Default)]
pub(crate) struct LoopReport {
    pub stats: BatcherStats,
    pub last_error: Option<String>,
}

pub(crate) struct Worker {
    config: BatchConfig,
    store: Arc<dyn Store>,
    notifier: FlushNotifier,
    counters: Arc<FlushCounters>,
    last_error: Option<String>,
}

impl Worker {
    pub(crate) fn new(
        config: BatchConfig,
        store: Arc<dyn Store>,
        notifier: FlushNotifier,
        counters: Arc<FlushCounters>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            counters,
            last_error: None,
        }
    }

    /// Run until `shutdown` fires or every sender is gone, then drain.
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<WriteRequest>,
        shutdown: CancellationToken,
    ) -> LoopReport {
        let mut batch = BatchAccumulator::new(self.config);

        tracing::debug!(
            max_batch_size = self.config.max_batch_size,
            flush_period_ms = self.config.flush_period.as_millis() as u64,
            "Coordination loop started"
        );

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    self.drain(&mut rx, &mut batch).await;
                    break;
                }

                () = sleep_until(batch.deadline()) => {
                    if !batch.is_empty() {
                        self.flush(batch.drain(), FlushTrigger::Timer).await;
                    }
                    batch.rearm();
                }

                maybe_request = rx.recv() => match maybe_request {
                    Some(request) => {
                        if batch.push(request) {
                            self.flush(batch.drain(), FlushTrigger::Size).await;
                            batch.rearm();
                        }
                    }
                    None => {
                        // Batcher dropped without stop()
                        if !batch.is_empty() {
                            self.flush(batch.drain(), FlushTrigger::Shutdown).await;
                        }
                        break;
                    }
                },
            }
        }

        let stats = self.counters.snapshot();
        tracing::debug!(
            batch_count = stats.batch_count,
            total_writes = stats.total_writes,
            "Coordination loop exited"
        );
        LoopReport {
            stats,
            last_error: self.last_error,
        }
    }

    /// Close the queue, flush everything already accepted, and return.
    async fn drain(
        &mut self,
        rx: &mut mpsc::Receiver<WriteRequest>,
        batch: &mut BatchAccumulator<WriteRequest>,
    ) {
        rx.close();

        let mut drained = 0usize;
        while let Some(request) = rx.recv().await {
            drained += 1;
            if batch.push(request) {
                self.flush(batch.drain(), FlushTrigger::Size).await;
            }
        }

        tracing::debug!(queued = drained, buffered = batch.len(), "Draining batcher");

        if !batch.is_empty() {
            self.flush(batch.drain(), FlushTrigger::Shutdown).await;
        }
    }

    /// Hand one batch to the store and account for the result.
    ///
    /// A batch the store rejects is dropped and reported, never retried.
    async fn flush(&mut self, batch: Vec<WriteRequest>, trigger: FlushTrigger) {
        let len = batch.len();
        let first_key = batch.first().map(|r| r.key().to_owned()).unwrap_or_default();
        let last_key = batch.last().map(|r| r.key().to_owned()).unwrap_or_default();
        let batch_id = generate_batch_id();

        let start = Instant::now();
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.batch_write(&batch))
            .await
            .unwrap_or_else(|e| Err(StoreError::TaskFailed(e.to_string())));
        let latency = start.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(()) => {
                self.counters.record_applied(len);
                record_flush(trigger, len, latency);
                tracing::debug!(
                    %batch_id,
                    ?trigger,
                    len,
                    total_writes = self.counters.snapshot().total_writes,
                    latency_ms = latency * 1000.0,
                    "Flushed batch"
                );
                FlushOutcome::Applied
            }
            Err(e) => {
                self.counters.record_dropped(len);
                record_flush_failure(trigger, len);
                tracing::error!(
                    %batch_id,
                    ?trigger,
                    len,
                    first_key = %first_key,
                    last_key = %last_key,
                    error = %e,
                    "Flush failed, batch dropped"
                );
                let message = e.to_string();
                self.last_error = Some(message.clone());
                FlushOutcome::Failed(message)
            }
        };

        let stats = self.counters.snapshot();
        self.notifier.notify(FlushEvent {
            batch_id,
            trigger,
            len,
            first_key,
            last_key,
            batch_count: stats.batch_count,
            total_writes: stats.total_writes,
            outcome,
        });
    }
}
