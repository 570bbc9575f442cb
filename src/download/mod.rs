//! Resilient request execution and chapter downloading.
//!
//! This module holds everything between an HTTP request and a page file on disk:
//!
//! - [`ThrottleTracker`] - per-endpoint block times and failure counts
//! - [`RequestExecutor`] - throttle-aware retries over a [`Transport`]
//! - [`DownloadOrchestrator`] - bounded-concurrency chapter downloads
//! - [`ImageReporter`] - fire-and-forget delivery reports for CDN images
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mdex_core::download::{
//!     EndpointKey, HttpRequest, RequestExecutor, RetryPolicy, ReqwestTransport, ThrottleTracker,
//! };
//! use mdex_core::SystemClock;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = Arc::new(ThrottleTracker::new(Arc::new(SystemClock)));
//! let executor = RequestExecutor::new(
//!     Arc::new(ReqwestTransport::new("mdex-dl")?),
//!     tracker,
//!     RetryPolicy::default(),
//!     Duration::from_secs(30),
//! );
//! let key = EndpointKey::new("GET /manga/{id}");
//! let response = executor
//!     .execute(&key, &HttpRequest::get("https://api.mangadex.org/manga/some-id"))
//!     .await?;
//! println!("HTTP {}", response.status);
//! # Ok(())
//! # }
//! ```

mod constants;
mod engine;
pub mod error;
mod executor;
pub mod filename;
mod report;
pub mod retry;
mod throttle;
mod transport;

pub use constants::{MAX_RATE_LIMIT_WAITS, MAX_THROTTLE_WAIT};
pub use engine::{
    ChapterDownload, ChapterStatus, DEFAULT_CONCURRENCY, DEFAULT_MAX_TITLE_LENGTH,
    DEFAULT_SAVE_ROOT, DownloadOptions, DownloadOrchestrator, DownloadStats,
    MAX_CHAPTER_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY, MangaReport, PageOutcome,
    PageResult,
};
pub use error::{
    ChapterError, EngineError, ExecuteError, ExhaustedError, FailureCause, TransportError,
    TransportErrorKind,
};
pub use executor::RequestExecutor;
pub use filename::SaveTarget;
pub use report::{DEFAULT_REPORT_ENDPOINT, ImageReport, ImageReporter};
pub use retry::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_JITTER, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_RETRIES,
    RequestOutcome, RetryPolicy,
};
pub use throttle::{EndpointKey, ThrottleState, ThrottleTracker};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

// Note: no module-local Result aliases; signatures spell out
// `Result<T, ExecuteError>` and friends explicitly.
