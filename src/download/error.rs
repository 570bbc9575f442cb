//! Error types for the download module.
//!
//! Errors are layered the same way requests are: a [`TransportError`] is a
//! single failed exchange, a [`FailureCause`] is why one attempt did not
//! succeed, an [`ExecuteError`] is the final verdict of the request executor,
//! and a [`ChapterError`] is why a whole chapter could not be attempted.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::throttle::EndpointKey;
use crate::api::ApiError;

/// Category of a network-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request or response body exceeded its time budget.
    Timeout,
    /// DNS resolution or TCP/TLS connection failed.
    Connect,
    /// The connection dropped while the body was being read.
    Body,
    /// Certificate or TLS negotiation failure.
    Tls,
    /// The request could not be built (bad URL, bad header).
    InvalidRequest,
    /// Anything else reported by the HTTP stack.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connection",
            Self::Body => "body read",
            Self::Tls => "TLS",
            Self::InvalidRequest => "invalid request",
            Self::Other => "network",
        };
        f.write_str(label)
    }
}

/// A request that produced no HTTP response.
#[derive(Debug, Error)]
#[error("{kind} error requesting {url}: {message}")]
pub struct TransportError {
    /// The URL being requested.
    pub url: String,
    /// Failure category, used for retry classification.
    pub kind: TransportErrorKind,
    /// Human-readable detail from the HTTP stack.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(url: impl Into<String>, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::new(url, TransportErrorKind::Timeout, "request timed out")
    }

    /// Creates a connection error.
    pub fn connect(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(url, TransportErrorKind::Connect, message)
    }
}

/// Why a single attempt did not succeed.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server answered 429 without a usable reset timestamp.
    #[error("HTTP 429 from {url} without a usable rate-limit reset header")]
    RateLimitWithoutReset {
        /// The requested URL.
        url: String,
    },

    /// No response was received.
    #[error(transparent)]
    Transport(TransportError),
}

impl FailureCause {
    /// Creates a status failure.
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    /// HTTP status, when the failure was an HTTP response.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimitWithoutReset { .. } => Some(429),
            Self::Transport(_) => None,
        }
    }
}

/// Retry budget ran out while the endpoint kept failing transiently.
#[derive(Debug, Error)]
#[error("gave up on {key} after {attempts} attempts: {last_cause}")]
pub struct ExhaustedError {
    /// Endpoint bucket the request belonged to.
    pub key: EndpointKey,
    /// Number of requests that were sent.
    pub attempts: u32,
    /// The failure observed on the final attempt.
    #[source]
    pub last_cause: FailureCause,
}

/// Final verdict of [`RequestExecutor::execute`](super::RequestExecutor::execute).
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A non-retryable failure; the request is not repeated.
    #[error("request to {key} failed permanently: {cause}")]
    Fatal {
        /// Endpoint bucket the request belonged to.
        key: EndpointKey,
        /// What went wrong.
        #[source]
        cause: FailureCause,
    },

    /// Transient failures (or rate limits) exhausted the budget.
    #[error(transparent)]
    Exhausted(ExhaustedError),

    /// The run was interrupted before the request could be sent.
    #[error("request to {key} cancelled")]
    Cancelled {
        /// Endpoint bucket the request belonged to.
        key: EndpointKey,
    },

    /// The endpoint is rate limited and the policy does not wait for it.
    #[error("request to {key} skipped: endpoint is rate limited")]
    Throttled {
        /// Endpoint bucket the request belonged to.
        key: EndpointKey,
    },
}

impl ExecuteError {
    /// Creates a fatal error.
    pub fn fatal(key: EndpointKey, cause: FailureCause) -> Self {
        Self::Fatal { key, cause }
    }

    /// Creates an exhausted error.
    pub fn exhausted(key: EndpointKey, attempts: u32, last_cause: FailureCause) -> Self {
        Self::Exhausted(ExhaustedError {
            key,
            attempts,
            last_cause,
        })
    }

    /// Creates a cancellation error.
    pub fn cancelled(key: EndpointKey) -> Self {
        Self::Cancelled { key }
    }

    /// Creates a throttled error.
    pub fn throttled(key: EndpointKey) -> Self {
        Self::Throttled { key }
    }

    /// Returns true if the run was interrupted.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Why a chapter could not be attempted at all.
#[derive(Debug, Error)]
pub enum ChapterError {
    /// The page manifest could not be fetched or decoded.
    #[error("could not fetch page manifest for chapter {chapter_id}: {source}")]
    Manifest {
        /// The chapter id.
        chapter_id: String,
        /// The API failure.
        #[source]
        source: ApiError,
    },

    /// The manifest lists no pages.
    #[error("page manifest for chapter {chapter_id} lists no pages")]
    EmptyManifest {
        /// The chapter id.
        chapter_id: String,
    },

    /// Another chapter already owns the target directory.
    #[error("{path} already holds chapter {existing_id}, refusing to write chapter {chapter_id}")]
    Collision {
        /// The contested directory.
        path: PathBuf,
        /// The chapter id that owns it.
        existing_id: String,
        /// The chapter id that was refused.
        chapter_id: String,
    },

    /// File system error preparing the chapter directory.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ChapterError {
    /// Creates a manifest error.
    pub fn manifest(chapter_id: impl Into<String>, source: ApiError) -> Self {
        Self::Manifest {
            chapter_id: chapter_id.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while constructing a [`DownloadOrchestrator`](super::DownloadOrchestrator).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Page concurrency outside the supported range.
    #[error("page concurrency must be between {min} and {max}, got {value}")]
    InvalidConcurrency {
        /// Requested value.
        value: usize,
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },

    /// Chapter concurrency outside the supported range.
    #[error("chapter concurrency must be between {min} and {max}, got {value}")]
    InvalidChapterConcurrency {
        /// Requested value.
        value: usize,
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
}

// No From impls: every variant needs context (url, key, path) the source
// error does not carry, so callers go through the helper constructors.
