//! Constants for the download module (timeouts, throttling, retry bounds).

use std::time::Duration;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum time a single endpoint may be blocked by a rate-limit timestamp (1 hour).
///
/// Reset timestamps further in the future are clamped to `now + MAX_THROTTLE_WAIT`.
pub const MAX_THROTTLE_WAIT: Duration = Duration::from_secs(3600);

/// Warning threshold for cumulative rate-limit waiting on one request (30 seconds).
pub const CUMULATIVE_WAIT_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Number of rate-limit responses tolerated for one logical request before giving up.
///
/// Rate-limit waits do not consume the retry budget, so this bounds a server
/// that answers 429 forever.
pub const MAX_RATE_LIMIT_WAITS: u32 = 8;

/// Response header carrying the absolute UNIX time at which an endpoint reopens.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-retry-after";

/// CDN cache status header used for image reports.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// File extension used for in-progress page writes.
pub const PARTIAL_EXTENSION: &str = "part";

/// Marker file recording which chapter id owns a chapter directory.
pub const CHAPTER_MARKER_FILE: &str = ".chapter-id";
