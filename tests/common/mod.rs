//! Test utilities for Spillway integration tests.
//!
//! Provides:
//! - Temporary data directory fixture
//! - A store that records every batch and can be told to fail
//! - Request and flush event helpers

#![allow(dead_code)]

use spillway::observability::tracing::init_test_tracing;
use spillway::{BatchConfig, Batcher, FlushEvent, MemoryStore, Store, StoreError, WriteRequest};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Test fixture that manages a temporary data directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Store wrapper that remembers every batch it was handed, in order.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    batches: Mutex<Vec<Vec<WriteRequest>>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Batches successfully applied, in flush order.
    pub fn batches(&self) -> Vec<Vec<WriteRequest>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_lens(&self) -> Vec<usize> {
        self.batches().iter().map(Vec::len).collect()
    }

    /// All applied requests, concatenated in flush order.
    pub fn flattened(&self) -> Vec<WriteRequest> {
        self.batches().into_iter().flatten().collect()
    }

    /// Make subsequent batch writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long inside every batch write.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl Store for RecordingStore {
    fn batch_write(&self, batch: &[WriteRequest]) -> Result<(), StoreError> {
        if let Some(delay) = *self.delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::TaskFailed("injected failure".into()));
        }
        self.inner.batch_write(batch)?;
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }
}

/// Build a batcher over `store` without starting it.
pub fn batcher(store: Arc<dyn Store>, batch_size: usize, flush_period_ms: u64) -> Batcher {
    init_test_tracing();
    Batcher::new(
        store,
        BatchConfig::from_config(batch_size, flush_period_ms, 1024),
    )
    .expect("valid config")
}

/// `count` requests `{prefix}{i}` -> `v{i}`.
pub fn requests(prefix: &str, count: usize) -> Vec<WriteRequest> {
    (0..count)
        .map(|i| WriteRequest::new(format!("{prefix}{i}"), format!("v{i}")))
        .collect()
}

/// Wait for the next flush event, failing the test after `timeout`.
pub async fn next_event(rx: &mut broadcast::Receiver<FlushEvent>, timeout: Duration) -> FlushEvent {
    tokio::time::timeout(timeout, rx.recv())
        .await
        .expect("timed out waiting for flush event")
        .expect("flush event channel closed")
}
