//! Spillway: a bounded write batcher in front of a key/value store.
//!
//! Producers submit individual writes; a single coordination task gathers
//! them and applies them to the store as atomic batches, either when a batch
//! fills up or when the flush period elapses, whichever comes first.
//! Shutdown drains everything that was accepted before returning.
//!
//! # Architecture
//!
//! - **Bounded ingestion**: a capacity-limited MPSC queue between producers and the loop
//! - **Two triggers**: size and time, with a size flush restarting the clock
//! - **Drain on stop**: `stop()` returns only after the final flush
//! - **Observable**: tracing, OpenTelemetry metrics, and a flush event bus
//!
//! # Modules
//!
//! - [`batcher`]: The batcher, its lifecycle, and the coordination loop
//! - [`config`]: CLI and environment configuration
//! - [`load`]: Producer used by the load-driver binary
//! - [`notify`]: Flush event bus
//! - [`observability`]: Metrics and tracing setup
//! - [`storage`]: The `Store` contract with in-memory and SQLite backends

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::memory::MemoryStore is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes  // r#""# is fine for SQL
)]

pub mod batcher;
pub mod config;
pub mod load;
pub mod notify;
pub mod observability;
pub mod storage;

pub use batcher::{BatchConfig, Batcher, BatcherError, BatcherState, BatcherStats};
pub use notify::{FlushEvent, FlushOutcome, FlushTrigger};
pub use storage::{MemoryStore, SqliteStore, Store, StoreError, WriteRequest};

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) batch ID.
///
/// Batch IDs tag flush events and log lines so a single flush can be
/// followed across the loop, the store, and any event subscribers.
///
/// # Example
///
/// ```
/// let id = spillway::generate_batch_id();
/// assert!(id.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_batch_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
