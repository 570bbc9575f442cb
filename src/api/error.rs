//! Error types for remote API calls.

use thiserror::Error;

use crate::download::ExecuteError;

/// Errors returned by [`ApiClient`](super::ApiClient) and [`PaginatedLister`](super::PaginatedLister).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself failed (fatal status, exhausted retries, cancelled).
    #[error(transparent)]
    Request(ExecuteError),

    /// The response body did not match the expected shape.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        /// The requested URL.
        url: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The service answered with `"result": "error"`.
    #[error("API error from {url}: {detail}")]
    Remote {
        /// The requested URL.
        url: String,
        /// Error titles and details reported by the service.
        detail: String,
    },

    /// The listing does not fit in the service's offset/limit window.
    #[error(
        "listing has {total} records but only the first {max_window} are reachable; narrow the query"
    )]
    PaginationWindow {
        /// Total reported by the service.
        total: usize,
        /// Largest reachable `offset + limit`.
        max_window: usize,
    },

    /// The service ran out of records before the total it reported.
    #[error("listing ended after {received} of {expected} records")]
    IncompleteListing {
        /// Records the listing should have produced.
        expected: usize,
        /// Records actually received.
        received: usize,
    },

    /// The API root or an id produced an unusable URL.
    #[error("invalid API URL {url}")]
    InvalidUrl {
        /// The offending URL or base.
        url: String,
    },
}

impl ApiError {
    /// Wraps an executor failure.
    pub fn request(source: ExecuteError) -> Self {
        Self::Request(source)
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true if the run was interrupted.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Request(error) if error.is_cancelled())
    }
}
