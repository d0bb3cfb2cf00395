//! Flush trigger tests.
//!
//! Covers:
//! - Size trigger, and the timer restart it causes
//! - Time trigger for partial batches
//! - No flushes while idle
//! - Submission order survives batching
//! - Last write wins for duplicate keys in one batch

mod common;

use common::{batcher, next_event, requests, RecordingStore};
use spillway::{FlushTrigger, Store, WriteRequest};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn test_full_batch_flushes_immediately() {
    let store = RecordingStore::new();
    let batcher = batcher(store.clone(), 5, 60_000);
    let mut events = batcher.subscribe();
    batcher.start().unwrap();

    for req in requests("k", 5) {
        batcher.submit(req).await.unwrap();
    }

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert_eq!(event.trigger, FlushTrigger::Size);
    assert_eq!(event.len, 5);
    assert_eq!(event.first_key, "k0");
    assert_eq!(event.last_key, "k4");
    assert_eq!(event.batch_count, 1);
    assert_eq!(event.total_writes, 5);
    assert_eq!(store.batch_lens(), vec![5]);

    batcher.stop().await.unwrap();
    assert_eq!(store.batch_lens(), vec![5], "stop must not re-flush");
}

#[tokio::test]
async fn test_size_flush_restarts_timer() {
    let store = RecordingStore::new();
    let batcher = batcher(store.clone(), 3, 500);
    let mut events = batcher.subscribe();
    batcher.start().unwrap();

    // Let part of the first period pass so the original deadline is distinguishable
    tokio::time::sleep(Duration::from_millis(300)).await;

    for req in requests("a", 3) {
        batcher.submit(req).await.unwrap();
    }
    let size_flush = next_event(&mut events, Duration::from_secs(2)).await;
    assert_eq!(size_flush.trigger, FlushTrigger::Size);

    batcher.submit(WriteRequest::new("late", "1")).await.unwrap();

    // The original deadline (~200ms from now) must not fire for the late write
    let early = tokio::time::timeout(Duration::from_millis(350), events.recv()).await;
    assert!(early.is_err(), "late write flushed before a full period: {early:?}");
    assert_eq!(store.get("late").unwrap(), None);

    let timer_flush = next_event(&mut events, Duration::from_secs(2)).await;
    assert_eq!(timer_flush.trigger, FlushTrigger::Timer);
    assert_eq!(timer_flush.len, 1);
    assert_eq!(store.get("late").unwrap().as_deref(), Some("1"));

    batcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_partial_batch_flushes_after_period() {
    let store = RecordingStore::new();
    let batcher = batcher(store.clone(), 10, 200);
    let mut events = batcher.subscribe();
    batcher.start().unwrap();

    for req in requests("t", 3) {
        batcher.submit(req).await.unwrap();
    }
    assert_eq!(store.get("t0").unwrap(), None);

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert_eq!(event.trigger, FlushTrigger::Timer);
    assert_eq!(event.len, 3);
    assert_eq!(store.batch_lens(), vec![3]);
    assert_eq!(store.get("t2").unwrap().as_deref(), Some("v2"));

    let stats = batcher.stop().await.unwrap();
    assert_eq!(stats.batch_count, 1);
    assert_eq!(stats.total_writes, 3);
}

#[tokio::test]
async fn test_idle_batcher_never_flushes() {
    let store = RecordingStore::new();
    let batcher = batcher(store.clone(), 4, 30);
    let mut events = batcher.subscribe();
    batcher.start().unwrap();

    // Several periods with nothing to flush
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    let stats = batcher.stop().await.unwrap();
    assert_eq!(stats.batch_count, 0);
    assert_eq!(stats.total_writes, 0);
    assert!(store.batches().is_empty());
}

#[tokio::test]
async fn test_flushed_batches_preserve_submission_order() {
    let store = RecordingStore::new();
    let batcher = batcher(store.clone(), 4, 40);
    batcher.start().unwrap();

    // 23 is not a multiple of 4; pauses let some batches go out on the timer
    let submitted = requests("o", 23);
    for (i, req) in submitted.iter().cloned().enumerate() {
        batcher.submit(req).await.unwrap();
        if i % 6 == 5 {
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
    }

    let stats = batcher.stop().await.unwrap();
    assert_eq!(stats.total_writes, 23);
    assert_eq!(store.flattened(), submitted);
    assert!(store.batch_lens().iter().all(|&len| (1..=4).contains(&len)));
}

#[tokio::test]
async fn test_last_write_wins_within_batch() {
    let store = RecordingStore::new();
    let batcher = batcher(store.clone(), 3, 60_000);
    let mut events = batcher.subscribe();
    batcher.start().unwrap();

    batcher.submit(WriteRequest::new("dup", "first")).await.unwrap();
    batcher.submit(WriteRequest::new("other", "x")).await.unwrap();
    batcher.submit(WriteRequest::new("dup", "second")).await.unwrap();

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert_eq!(event.len, 3);
    assert_eq!(store.get("dup").unwrap().as_deref(), Some("second"));

    batcher.stop().await.unwrap();
}
