//! MangaDex Downloader Core Library
//!
//! This library provides the core of the `mdex-dl` tool: a rate-limit-aware,
//! resilient download orchestrator for the paginated, chapter-based MangaDex API.
//!
//! # Architecture
//!
//! Data flows top-down through the following modules:
//! - [`download`] - Download orchestrator, resilient request executor, throttle tracker
//! - [`catalog`] - Chapter catalog building (language filter, ordering, de-duplication)
//! - [`api`] - Endpoint definitions, remote record models, paginated listing
//! - [`clock`] - Wall-clock abstraction shared by the throttle tracker and executor
//! - [`config`] - Runtime configuration with defaults and validation
//! - [`selection`] - Chapter selection expressions (`1-3,7`)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod download;
pub mod selection;
mod user_agent;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, ChapterRecord, Manga, PageManifest, PaginatedLister};
pub use catalog::{Chapter, build_catalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DownloaderConfig};
pub use download::{
    ChapterDownload, ChapterStatus, DownloadOptions, DownloadOrchestrator, EndpointKey,
    ExecuteError, ExhaustedError, ImageReporter, MangaReport, RequestExecutor, RequestOutcome,
    RetryPolicy, ReqwestTransport, ThrottleTracker, Transport,
};
pub use selection::{Selection, SelectionError};
