//! Time source used for packet timestamps and step pauses.
//!
//! Production code runs on [`SystemClock`]; tests substitute [`TestClock`],
//! whose `pause_for` advances virtual time instantly.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    async fn pause_for(&self, duration: Duration);
}

/// Wall clock backed by `chrono::Utc` and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn pause_for(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic virtual clock for tests.
#[derive(Debug)]
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move virtual time forward without suspending.
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Default for TestClock {
    /// Starts at 2026-01-01T10:15:30Z.
    fn default() -> Self {
        Self::new(DateTime::from_timestamp(1_767_262_530, 0).unwrap_or_default())
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause_for(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
