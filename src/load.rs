//! Steady-rate producer used by the load-driver binary.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::batcher::{Batcher, BatcherError};
use crate::storage::WriteRequest;

/// Shape of the generated write stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProfile {
    /// Number of writes to submit
    pub writes: u64,
    /// Pause between consecutive writes
    pub interval: Duration,
    /// Keys are `{prefix}{i}`, values `val{i}`
    pub key_prefix: String,
}

impl LoadProfile {
    pub fn from_config(writes: u64, interval_ms: u64, key_prefix: &str) -> Self {
        Self {
            writes,
            interval: Duration::from_millis(interval_ms),
            key_prefix: key_prefix.to_owned(),
        }
    }

    /// The `i`-th request of this profile.
    pub fn request(&self, i: u64) -> WriteRequest {
        WriteRequest::new(format!("{}{i}", self.key_prefix), format!("val{i}"))
    }
}

/// Submit the profile's writes in order until done or cancelled.
///
/// Returns the number of writes accepted. A batcher that stops underneath
/// the producer ends the run early rather than failing it.
pub async fn run_producer(
    batcher: &Batcher,
    profile: &LoadProfile,
    cancel: CancellationToken,
) -> Result<u64, BatcherError> {
    let mut submitted = 0;

    for i in 0..profile.writes {
        if cancel.is_cancelled() {
            break;
        }

        match batcher.submit(profile.request(i)).await {
            Ok(()) => submitted += 1,
            Err(BatcherError::NotRunning) => {
                tracing::warn!(submitted, "Batcher stopped, producer exiting early");
                break;
            }
            Err(e) => return Err(e),
        }

        if !profile.interval.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(profile.interval) => {}
            }
        }
    }

    tracing::info!(submitted, requested = profile.writes, "Producer finished");
    Ok(submitted)
}
