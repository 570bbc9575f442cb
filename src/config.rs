//! Runtime configuration with defaults and validation.
//!
//! [`DownloaderConfig`] carries every tunable of a run. The binary fills it from
//! defaults, then the config file, then command-line flags, and calls
//! [`DownloaderConfig::validate`] before building anything from it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::{DEFAULT_API_ROOT, ImageQuality, MAX_PAGE_SIZE};
use crate::download::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_JITTER, DEFAULT_BACKOFF_MAX, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_TITLE_LENGTH, DEFAULT_REPORT_ENDPOINT, DEFAULT_SAVE_ROOT,
    DownloadOptions, MAX_CHAPTER_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY, RequestExecutor,
    RetryPolicy, ThrottleTracker, Transport,
};

/// Default timeout for API and image requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for image reports.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default chapter language.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Upper bound for `max_title_length`.
pub const MAX_TITLE_LENGTH_LIMIT: usize = 255;

/// One invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProblem {
    /// Name of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.field, self.message)
    }
}

/// Every problem found by [`DownloaderConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", join_problems(.problems))]
pub struct ConfigError {
    /// Problems in field order.
    pub problems: Vec<ConfigProblem>,
}

impl ConfigError {
    /// Returns true if `field` has a problem.
    #[must_use]
    pub fn mentions(&self, field: &str) -> bool {
        self.problems.iter().any(|p| p.field == field)
    }
}

fn join_problems(problems: &[ConfigProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every tunable of a download run.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloaderConfig {
    /// Total attempts per request (1 means no retry).
    pub max_retries: u32,
    /// Base of the exponential backoff.
    pub backoff_factor: Duration,
    /// Random spread added to each backoff delay.
    pub backoff_jitter: Duration,
    /// Cap on a single backoff delay.
    pub backoff_max: Duration,
    /// Per-request timeout for API calls and image fetches.
    pub request_timeout: Duration,
    /// Records requested per listing page.
    pub page_size: usize,
    /// Exact language code chapters must match.
    pub language: String,
    /// Pages in flight per chapter.
    pub concurrency_limit: usize,
    /// Chapters processed at once.
    pub chapter_concurrency: usize,
    /// Root of the output tree.
    pub save_root: PathBuf,
    /// Cap on the manga title directory name.
    pub max_title_length: usize,
    /// Base URL of the API.
    pub api_root: String,
    /// Image report endpoint.
    pub report_endpoint: String,
    /// Timeout for one image report.
    pub report_timeout: Duration,
    /// Download the compressed image variant.
    pub use_data_saver: bool,
    /// Include pornographic titles in search results and feeds.
    pub include_pornographic: bool,
    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
            backoff_max: DEFAULT_BACKOFF_MAX,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: MAX_PAGE_SIZE,
            language: DEFAULT_LANGUAGE.to_string(),
            concurrency_limit: DEFAULT_CONCURRENCY,
            chapter_concurrency: 1,
            save_root: PathBuf::from(DEFAULT_SAVE_ROOT),
            max_title_length: DEFAULT_MAX_TITLE_LENGTH,
            api_root: DEFAULT_API_ROOT.to_string(),
            report_endpoint: DEFAULT_REPORT_ENDPOINT.to_string(),
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            use_data_saver: false,
            include_pornographic: false,
            user_agent: crate::user_agent::default_user_agent(),
        }
    }
}

impl DownloaderConfig {
    /// Checks every value and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] listing each invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut check = |ok: bool, field: &'static str, message: String| {
            if !ok {
                problems.push(ConfigProblem { field, message });
            }
        };

        check(
            (1..=MAX_RETRIES_LIMIT).contains(&self.max_retries),
            "max_retries",
            format!("must be between 1 and {MAX_RETRIES_LIMIT}, got {}", self.max_retries),
        );
        check(
            !self.backoff_max.is_zero(),
            "backoff_max",
            "must be greater than zero".to_string(),
        );
        check(
            !self.request_timeout.is_zero(),
            "request_timeout",
            "must be greater than zero".to_string(),
        );
        check(
            !self.report_timeout.is_zero(),
            "report_timeout",
            "must be greater than zero".to_string(),
        );
        check(
            (1..=MAX_PAGE_SIZE).contains(&self.page_size),
            "page_size",
            format!("must be between 1 and {MAX_PAGE_SIZE}, got {}", self.page_size),
        );
        check(
            !self.language.trim().is_empty(),
            "language",
            "must not be empty".to_string(),
        );
        check(
            (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency_limit),
            "concurrency_limit",
            format!(
                "must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}, got {}",
                self.concurrency_limit
            ),
        );
        check(
            (1..=MAX_CHAPTER_CONCURRENCY).contains(&self.chapter_concurrency),
            "chapter_concurrency",
            format!(
                "must be between 1 and {MAX_CHAPTER_CONCURRENCY}, got {}",
                self.chapter_concurrency
            ),
        );
        check(
            (1..=MAX_TITLE_LENGTH_LIMIT).contains(&self.max_title_length),
            "max_title_length",
            format!(
                "must be between 1 and {MAX_TITLE_LENGTH_LIMIT}, got {}",
                self.max_title_length
            ),
        );
        check(
            is_http_url(&self.api_root),
            "api_root",
            format!("must be an http:// or https:// URL, got '{}'", self.api_root),
        );
        check(
            is_http_url(&self.report_endpoint),
            "report_endpoint",
            format!(
                "must be an http:// or https:// URL, got '{}'",
                self.report_endpoint
            ),
        );
        check(
            !self.user_agent.trim().is_empty(),
            "user_agent",
            "must not be empty".to_string(),
        );

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    /// Retry policy described by the backoff settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.backoff_factor,
            self.backoff_jitter,
            self.backoff_max,
        )
    }

    /// Image variant to download.
    #[must_use]
    pub fn quality(&self) -> ImageQuality {
        if self.use_data_saver {
            ImageQuality::DataSaver
        } else {
            ImageQuality::Data
        }
    }

    /// Orchestrator options described by this config.
    #[must_use]
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            save_root: self.save_root.clone(),
            concurrency_limit: self.concurrency_limit,
            chapter_concurrency: self.chapter_concurrency,
            max_title_length: self.max_title_length,
            quality: self.quality(),
        }
    }

    /// Executor over `transport` that shares `tracker`.
    #[must_use]
    pub fn executor(
        &self,
        transport: Arc<dyn Transport>,
        tracker: Arc<ThrottleTracker>,
    ) -> RequestExecutor {
        RequestExecutor::new(transport, tracker, self.retry_policy(), self.request_timeout)
    }
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value)
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DownloaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.language, "en");
        assert_eq!(config.save_root, PathBuf::from("manga"));
        assert_eq!(config.quality(), ImageQuality::Data);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let config = DownloaderConfig {
            max_retries: 0,
            page_size: 101,
            concurrency_limit: 33,
            language: "  ".into(),
            api_root: "ftp://example.com".into(),
            request_timeout: Duration::ZERO,
            ..DownloaderConfig::default()
        };

        let error = config.validate().unwrap_err();

        for field in [
            "max_retries",
            "page_size",
            "concurrency_limit",
            "language",
            "api_root",
            "request_timeout",
        ] {
            assert!(error.mentions(field), "missing {field}: {error}");
        }
        assert_eq!(error.problems.len(), 6);
        assert!(!error.mentions("chapter_concurrency"));
    }

    #[test]
    fn test_error_message_names_fields() {
        let config = DownloaderConfig {
            chapter_concurrency: 0,
            ..DownloaderConfig::default()
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.starts_with("invalid configuration:"));
        assert!(message.contains("`chapter_concurrency` must be between 1 and 8, got 0"));
    }

    #[test]
    fn test_download_options_follow_config() {
        let config = DownloaderConfig {
            use_data_saver: true,
            concurrency_limit: 8,
            save_root: PathBuf::from("/tmp/out"),
            ..DownloaderConfig::default()
        };
        let options = config.download_options();
        assert_eq!(options.quality, ImageQuality::DataSaver);
        assert_eq!(options.concurrency_limit, 8);
        assert_eq!(options.save_root, PathBuf::from("/tmp/out"));
        assert_eq!(config.retry_policy().max_attempts(), 5);
    }
}
