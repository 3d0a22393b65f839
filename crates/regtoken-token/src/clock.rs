//! # Decision Clock
//!
//! Every rule that depends on time (locks, hold-up, flowback) is evaluated
//! at an instant supplied by a [`Clock`]. Production tokens use the system
//! clock; tests drive a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use regtoken_core::Timestamp;

/// Source of decision times.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A settable clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(start.epoch_secs())),
        }
    }

    /// Jump to `at`.
    pub fn set(&self, at: Timestamp) {
        self.secs.store(at.epoch_secs(), Ordering::SeqCst);
    }

    /// Move forward by `secs`, saturating at the largest instant. Returns
    /// the new time.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let previous = match self
            .secs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                Some(s.saturating_add(secs))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        Timestamp::from_epoch_secs(previous.saturating_add(secs))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_epoch_secs(self.secs.load(Ordering::SeqCst))
    }
}
