//! Wall-clock abstraction for throttle bookkeeping.
//!
//! The remote service advertises rate-limit reopen times as absolute UNIX
//! timestamps, so throttling decisions are made against wall-clock time rather
//! than a monotonic instant. [`SystemClock`] is used at runtime; [`ManualClock`]
//! is a logical clock whose `sleep` advances time instantly, which lets tests
//! assert that no request is sent before an advertised timestamp.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

/// Source of wall-clock time and suspension.
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by `SystemTime` and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Logical clock that only moves when a caller sleeps or [`advance`](Self::advance) is called.
///
/// Sleeping moves the clock to `max(now, time_at_call + duration)`, so
/// concurrent sleepers waiting for the same deadline do not push time past it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Creates a clock frozen at `secs` seconds after the UNIX epoch.
    #[must_use]
    pub fn at_unix_secs(secs: u64) -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += duration;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let target = *now + duration;
            if target > *now {
                *now = target;
            }
        }
        tokio::task::yield_now().await;
    }
}

/// Converts a UNIX timestamp in whole seconds to a `SystemTime`.
///
/// Returns `None` for negative values.
#[must_use]
pub fn from_unix_secs(secs: i64) -> Option<SystemTime> {
    let secs = u64::try_from(secs).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}
