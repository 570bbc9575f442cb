//! Response classification and exponential backoff for the request executor.
//!
//! Every exchange is reduced to a [`RequestOutcome`]:
//! - [`RequestOutcome::Success`] - any status below 400
//! - [`RequestOutcome::RateLimited`] - 429 carrying a reset timestamp
//! - [`RequestOutcome::TransientFailure`] - worth repeating after a backoff
//! - [`RequestOutcome::FatalFailure`] - repeating would not help
//!
//! [`RetryPolicy`] supplies the attempt budget and the backoff delay between
//! transient failures.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mdex_core::download::RetryPolicy;
//!
//! let policy = RetryPolicy::new(
//!     5,
//!     Duration::from_secs(1),
//!     Duration::ZERO,
//!     Duration::from_secs(30),
//! );
//! assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
//! ```

use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, instrument};

use super::constants::RATE_LIMIT_RESET_HEADER;
use super::error::{FailureCause, TransportError, TransportErrorKind};
use super::transport::HttpResponse;
use crate::clock::from_unix_secs;

/// Default total attempts per logical request.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default backoff factor (1 second).
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Default jitter amplitude (500ms either way).
pub const DEFAULT_BACKOFF_JITTER: Duration = Duration::from_millis(500);

/// Default backoff ceiling (30 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Exponent cap; `2^30` seconds is far beyond any sane ceiling.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Classified result of a single exchange.
#[derive(Debug)]
pub enum RequestOutcome {
    /// The server answered with a status below 400.
    Success(HttpResponse),

    /// The server refused with 429 and named the time the endpoint reopens.
    RateLimited {
        /// Absolute reopen time taken from the reset header.
        retry_at: SystemTime,
    },

    /// A failure that may succeed if repeated.
    TransientFailure(FailureCause),

    /// A failure that will not succeed if repeated.
    FatalFailure(FailureCause),
}

impl RequestOutcome {
    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientFailure(_) => "transient",
            Self::FatalFailure(_) => "fatal",
        }
    }
}

/// Attempt budget and backoff shape.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `backoff_factor`: 1 second
/// - `backoff_jitter`: 500ms
/// - `backoff_max`: 30 seconds
///
/// # Delay Calculation
///
/// ```text
/// delay = clamp(factor * 2^(n - 1) + uniform(-jitter, +jitter), 0, backoff_max)
/// ```
///
/// where `n` is the number of transient failures seen so far (1-indexed).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: Duration,
    backoff_jitter: Duration,
    backoff_max: Duration,
    waits_on_rate_limit: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
            backoff_max: DEFAULT_BACKOFF_MAX,
            waits_on_rate_limit: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Total attempts including the first (clamped to >= 1)
    /// * `backoff_factor` - Delay after the first transient failure
    /// * `backoff_jitter` - Half-width of the uniform jitter window
    /// * `backoff_max` - Ceiling for any single delay
    #[must_use]
    pub fn new(
        max_attempts: u32,
        backoff_factor: Duration,
        backoff_jitter: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_factor,
            backoff_jitter,
            backoff_max,
            waits_on_rate_limit: true,
        }
    }

    /// A policy that sends at most once and never sleeps.
    ///
    /// A rate-limited endpoint is given up on instead of waited for.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, Duration::ZERO).without_rate_limit_waits()
    }

    /// Same policy, but rate limits end the request instead of pausing it.
    #[must_use]
    pub fn without_rate_limit_waits(&self) -> Self {
        Self {
            waits_on_rate_limit: false,
            ..self.clone()
        }
    }

    /// Returns false if a rate-limited endpoint ends the request.
    #[must_use]
    pub fn waits_on_rate_limit(&self) -> bool {
        self.waits_on_rate_limit
    }

    /// Same backoff shape with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }

    /// Total attempts allowed per logical request.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Ceiling for a single backoff delay.
    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }

    /// Backoff before the next attempt, after `failures` transient failures.
    ///
    /// Jitter is drawn uniformly from `[-jitter, +jitter]`; the result is
    /// clamped to `[0, backoff_max]`.
    #[must_use]
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let base = self.base_delay_secs(failures);
        let jitter = self.jitter_secs();
        let max = self.backoff_max.as_secs_f64();
        Duration::from_secs_f64((base + jitter).clamp(0.0, max))
    }

    fn base_delay_secs(&self, failures: u32) -> f64 {
        let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.backoff_factor.as_secs_f64() * f64::from(1_u32 << exponent)
    }

    fn jitter_secs(&self) -> f64 {
        let amplitude = self.backoff_jitter.as_secs_f64();
        if amplitude <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(-amplitude..=amplitude)
    }
}

/// Classifies an HTTP response.
///
/// # Status Classification
///
/// | Status | Outcome | Rationale |
/// |--------|---------|-----------|
/// | < 400 | Success | |
/// | 408 | Transient | Request timeout - may succeed |
/// | 429 + reset header | RateLimited | Wait until the advertised time |
/// | 429, no/invalid header | Transient | Back off like any overload |
/// | other 4xx | Fatal | Client error - won't succeed on retry |
/// | 5xx | Transient | Server error - may be temporary |
#[must_use]
#[instrument(skip(response), fields(status = response.status, url = %response.url))]
pub fn classify_response(response: HttpResponse) -> RequestOutcome {
    let status = response.status;
    if status < 400 {
        return RequestOutcome::Success(response);
    }

    if status == 429 {
        return match response
            .header(RATE_LIMIT_RESET_HEADER)
            .and_then(parse_rate_limit_reset)
        {
            Some(retry_at) => RequestOutcome::RateLimited { retry_at },
            None => {
                debug!("429 without usable reset header, treating as transient");
                RequestOutcome::TransientFailure(FailureCause::RateLimitWithoutReset {
                    url: response.url,
                })
            }
        };
    }

    let cause = FailureCause::status(response.url, status);
    if status == 408 || status >= 500 {
        RequestOutcome::TransientFailure(cause)
    } else {
        RequestOutcome::FatalFailure(cause)
    }
}

/// Classifies a failed exchange that produced no response.
///
/// Timeouts, connection failures and interrupted bodies are transient; TLS
/// and malformed-request failures are fatal.
#[must_use]
pub fn classify_transport_error(error: TransportError) -> RequestOutcome {
    match error.kind {
        TransportErrorKind::Timeout
        | TransportErrorKind::Connect
        | TransportErrorKind::Body
        | TransportErrorKind::Other => {
            RequestOutcome::TransientFailure(FailureCause::Transport(error))
        }
        TransportErrorKind::Tls | TransportErrorKind::InvalidRequest => {
            RequestOutcome::FatalFailure(FailureCause::Transport(error))
        }
    }
}

/// Parses the rate-limit reset header (absolute UNIX seconds).
///
/// Fractional values are truncated; negative and non-numeric values yield `None`.
#[must_use]
pub fn parse_rate_limit_reset(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return from_unix_secs(secs);
    }
    let secs = value.parse::<f64>().ok().filter(|secs| secs.is_finite())?;
    if secs < 0.0 {
        return None;
    }
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs_f64(secs.trunc()))
}
