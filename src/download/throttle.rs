//! Per-endpoint throttle state shared by every in-flight request.
//!
//! This module provides the [`ThrottleTracker`], which remembers, for each
//! [`EndpointKey`], the wall-clock time before which no request may be sent
//! and how many transient failures happened in a row.
//!
//! # Overview
//!
//! Throttling is applied per endpoint bucket: requests to different buckets
//! proceed independently, while a rate-limit response on one bucket blocks
//! every worker that targets it until the advertised reopen time.
//!
//! Bucket state lives in a `DashMap`; each read or update is a short critical
//! section on one shard and no shard lock is held across an `.await`. Waiting
//! callers re-check the bucket after every sleep, so a block recorded by a
//! sibling while they slept is honored.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_WAIT_WARNING_THRESHOLD, MAX_THROTTLE_WAIT};
use super::retry::RequestOutcome;
use crate::clock::Clock;

/// Identifier of a throttle bucket, e.g. `GET /manga/{id}/feed` or `image cdn.example`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey(Arc<str>);

impl EndpointKey {
    /// Creates a key from a route template or bucket name.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Bucket for images served from `host`.
    pub fn image_host(host: &str) -> Self {
        Self::new(format!("image {}", host.to_ascii_lowercase()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    /// No request may be sent before this time.
    pub blocked_until: Option<SystemTime>,
    /// Transient failures observed in a row.
    pub consecutive_failures: u32,
}

/// Shared per-endpoint throttle bookkeeping.
///
/// Wrap in `Arc` and share between all executors that talk to the same service.
#[derive(Debug)]
pub struct ThrottleTracker {
    buckets: DashMap<EndpointKey, ThrottleState>,
    clock: Arc<dyn Clock>,
}

impl ThrottleTracker {
    /// Creates an empty tracker reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Clock used for every throttle decision.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns true if `key` may be requested right now.
    #[must_use]
    pub fn may_request(&self, key: &EndpointKey) -> bool {
        self.wait_time(key).is_none()
    }

    /// Remaining time before `key` reopens, or `None` if it is open.
    ///
    /// The result never exceeds [`MAX_THROTTLE_WAIT`].
    #[must_use]
    pub fn wait_time(&self, key: &EndpointKey) -> Option<Duration> {
        let blocked_until = self.buckets.get(key)?.blocked_until?;
        let remaining = blocked_until.duration_since(self.clock.now()).ok()?;
        if remaining.is_zero() {
            return None;
        }
        Some(remaining.min(MAX_THROTTLE_WAIT))
    }

    /// Copy of the current state of `key` (default state if never seen).
    #[must_use]
    pub fn state(&self, key: &EndpointKey) -> ThrottleState {
        self.buckets
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Updates the bucket for `key` from the outcome of a request.
    ///
    /// - `Success` resets the failure streak and lifts a block that has already
    ///   expired. A block still in the future stays, since the success may
    ///   belong to a request that was in flight when the block was recorded.
    /// - `RateLimited` blocks the bucket until the advertised time, clamped to
    ///   `now + MAX_THROTTLE_WAIT`; an existing later block is kept.
    /// - `TransientFailure` extends the failure streak.
    /// - `FatalFailure` leaves the bucket untouched.
    #[instrument(skip(self, outcome), fields(key = %key))]
    pub fn record(&self, key: &EndpointKey, outcome: &RequestOutcome) {
        let now = self.clock.now();
        let mut entry = self.buckets.entry(key.clone()).or_default();
        let state = entry.value_mut();

        match outcome {
            RequestOutcome::Success(_) => {
                state.consecutive_failures = 0;
                if state.blocked_until.is_some_and(|until| until <= now) {
                    state.blocked_until = None;
                }
            }
            RequestOutcome::RateLimited { retry_at } => {
                let ceiling = now + MAX_THROTTLE_WAIT;
                if *retry_at > ceiling {
                    warn!(
                        key = %key,
                        max_secs = MAX_THROTTLE_WAIT.as_secs(),
                        "rate-limit reset exceeds maximum wait, clamping"
                    );
                }
                let until = (*retry_at).min(ceiling);
                let until = state.blocked_until.map_or(until, |existing| existing.max(until));
                state.blocked_until = Some(until);
                debug!(
                    key = %key,
                    wait_ms = until.duration_since(now).unwrap_or_default().as_millis(),
                    "endpoint blocked by rate limit"
                );
            }
            RequestOutcome::TransientFailure(_) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                debug!(
                    key = %key,
                    consecutive_failures = state.consecutive_failures,
                    "recorded transient failure"
                );
            }
            RequestOutcome::FatalFailure(_) => {}
        }
    }

    /// Suspends until `key` is open, re-checking after every sleep.
    ///
    /// Returns the total time spent waiting.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn wait_until_open(&self, key: &EndpointKey) -> Duration {
        let mut waited = Duration::ZERO;
        let mut warned = false;

        // The DashMap guard is dropped inside wait_time, never held across the sleep.
        while let Some(wait) = self.wait_time(key) {
            debug!(key = %key, wait_ms = wait.as_millis(), "waiting for endpoint to reopen");
            self.clock.sleep(wait).await;
            waited += wait;

            if !warned && waited >= CUMULATIVE_WAIT_WARNING_THRESHOLD {
                warned = true;
                warn!(
                    key = %key,
                    waited_secs = waited.as_secs(),
                    "excessive rate limiting - server may be under heavy load"
                );
            }
        }

        waited
    }
}
