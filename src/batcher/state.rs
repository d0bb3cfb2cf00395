//! Batcher lifecycle state.
//!
//! `Created -> Running -> Draining -> Stopped`, held in an `AtomicU8` so
//! producers can check it without taking a lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`Batcher`](super::Batcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BatcherState {
    /// Configured, queue allocated, no loop running.
    Created = 0,
    /// Loop active, submits accepted.
    Running = 1,
    /// Stop requested; the loop is flushing what it already accepted.
    Draining = 2,
    /// Terminal.
    Stopped = 3,
}

impl BatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    /// Whether submits are currently accepted.
    pub fn accepts_writes(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for BatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`BatcherState`].
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(BatcherState::Created as u8),
        }
    }

    pub(crate) fn load(&self) -> BatcherState {
        BatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to` only if the current state is `from`.
    ///
    /// Returns the actual state on failure.
    pub(crate) fn transition(&self, from: BatcherState, to: BatcherState) -> Result<(), BatcherState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(BatcherState::from_u8)
    }

    pub(crate) fn set(&self, to: BatcherState) {
        self.state.store(to as u8, Ordering::SeqCst);
    }
}
