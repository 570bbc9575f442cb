//! Resilient request executor.
//!
//! [`RequestExecutor::execute`] turns one logical request into as many sends
//! as it takes: it waits for the endpoint's throttle bucket to reopen, sends,
//! classifies the answer, records it with the shared [`ThrottleTracker`], and
//! then either returns, backs off, or waits out a rate limit.
//!
//! Transient failures consume the attempt budget of the [`RetryPolicy`].
//! Rate-limit responses do not, since the wait is dictated by the server;
//! [`MAX_RATE_LIMIT_WAITS`] bounds them instead. A policy built with
//! [`RetryPolicy::without_rate_limit_waits`] never waits: a blocked or
//! rate-limiting endpoint ends the request with [`ExecuteError::Throttled`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::constants::MAX_RATE_LIMIT_WAITS;
use super::error::{ExecuteError, FailureCause};
use super::retry::{RequestOutcome, RetryPolicy, classify_response, classify_transport_error};
use super::throttle::{EndpointKey, ThrottleTracker};
use super::transport::{HttpRequest, HttpResponse, Transport};

/// Sends requests with throttling, retry and backoff.
///
/// Cheap to clone; clones share the transport, tracker and interrupt flag.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    tracker: Arc<ThrottleTracker>,
    policy: RetryPolicy,
    timeout: Duration,
    interrupted: Arc<AtomicBool>,
}

impl RequestExecutor {
    /// Creates an executor.
    ///
    /// # Arguments
    ///
    /// * `transport` - Sends individual requests
    /// * `tracker` - Shared per-endpoint throttle state
    /// * `policy` - Attempt budget and backoff
    /// * `timeout` - Per-send timeout
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        tracker: Arc<ThrottleTracker>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            tracker,
            policy,
            timeout,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses `flag` as the interrupt signal; once set, no new request is sent.
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// A sibling executor sharing everything but the retry policy and timeout.
    #[must_use]
    pub fn with_policy(&self, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            policy,
            timeout,
            ..self.clone()
        }
    }

    /// The shared throttle tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<ThrottleTracker> {
        &self.tracker
    }

    /// The active retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The interrupt flag checked before every send.
    #[must_use]
    pub fn interrupt_flag(&self) -> &Arc<AtomicBool> {
        &self.interrupted
    }

    /// Returns true once the interrupt flag is set.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Executes `request` against the bucket `key` until it succeeds or gives up.
    ///
    /// # Errors
    ///
    /// - [`ExecuteError::Fatal`] on a non-retryable failure (first occurrence)
    /// - [`ExecuteError::Exhausted`] once `max_attempts` transient failures or
    ///   [`MAX_RATE_LIMIT_WAITS`] rate limits have been observed
    /// - [`ExecuteError::Cancelled`] if the interrupt flag is set before a send
    /// - [`ExecuteError::Throttled`] if the endpoint is rate limited and the
    ///   policy does not wait
    #[instrument(skip(self, request), fields(key = %key, url = %request.url))]
    pub async fn execute(
        &self,
        key: &EndpointKey,
        request: &HttpRequest,
    ) -> Result<HttpResponse, ExecuteError> {
        let max_attempts = self.policy.max_attempts();
        let mut failures: u32 = 0;
        let mut rate_limits: u32 = 0;

        loop {
            if self.is_interrupted() {
                return Err(ExecuteError::cancelled(key.clone()));
            }

            if !self.policy.waits_on_rate_limit() && !self.tracker.may_request(key) {
                debug!(key = %key, "endpoint blocked, not waiting");
                return Err(ExecuteError::throttled(key.clone()));
            }
            self.tracker.wait_until_open(key).await;

            if self.is_interrupted() {
                return Err(ExecuteError::cancelled(key.clone()));
            }

            let sent = failures + rate_limits + 1;
            debug!(key = %key, attempt = sent, "sending request");

            let outcome = match self.transport.send(request.clone(), self.timeout).await {
                Ok(response) => classify_response(response),
                Err(error) => classify_transport_error(error),
            };
            self.tracker.record(key, &outcome);

            match outcome {
                RequestOutcome::Success(response) => return Ok(response),

                RequestOutcome::FatalFailure(cause) => {
                    debug!(key = %key, error = %cause, "fatal failure, not retrying");
                    return Err(ExecuteError::fatal(key.clone(), cause));
                }

                RequestOutcome::RateLimited { retry_at } => {
                    if !self.policy.waits_on_rate_limit() {
                        debug!(key = %key, "rate limited, not waiting");
                        return Err(ExecuteError::throttled(key.clone()));
                    }
                    rate_limits += 1;
                    if rate_limits >= MAX_RATE_LIMIT_WAITS {
                        warn!(key = %key, rate_limits, "endpoint keeps rate limiting, giving up");
                        return Err(ExecuteError::exhausted(
                            key.clone(),
                            sent,
                            FailureCause::status(&request.url, 429),
                        ));
                    }
                    let wait = retry_at
                        .duration_since(self.tracker.clock().now())
                        .unwrap_or_default();
                    warn!(
                        key = %key,
                        wait_secs = wait.as_secs(),
                        "rate limited, waiting for endpoint to reopen"
                    );
                    // The tracker holds the block; the next iteration waits on it.
                }

                RequestOutcome::TransientFailure(cause) => {
                    failures += 1;
                    if failures >= max_attempts {
                        warn!(
                            key = %key,
                            attempts = failures,
                            error = %cause,
                            "retries exhausted"
                        );
                        return Err(ExecuteError::exhausted(key.clone(), sent, cause));
                    }

                    let delay = self.policy.backoff_delay(failures);
                    warn!(
                        key = %key,
                        attempt = failures,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %cause,
                        "transient failure, retrying"
                    );
                    if !delay.is_zero() {
                        self.tracker.clock().sleep(delay).await;
                    }
                }
            }
        }
    }
}
