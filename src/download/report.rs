//! Fire-and-forget image delivery reports.
//!
//! After each page fetch from a CDN node, the service asks clients to report
//! the outcome (success, size, latency, cache hit). Reports never affect the
//! download: they are sent once, without retries, and failures are only logged.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::constants::CACHE_STATUS_HEADER;
use super::executor::RequestExecutor;
use super::retry::RetryPolicy;
use super::throttle::EndpointKey;
use super::transport::{HttpRequest, HttpResponse};

/// Default report endpoint.
pub const DEFAULT_REPORT_ENDPOINT: &str = "https://api.mangadex.network/report";

/// Hosts whose images must not be reported.
const UNREPORTED_HOST_SUFFIX: &str = "mangadex.org";

/// Report payload for one image fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    /// Full image URL.
    pub url: String,
    /// Whether the image was received.
    pub success: bool,
    /// Bytes received.
    pub bytes: u64,
    /// Fetch duration in milliseconds.
    pub duration: u64,
    /// Whether the CDN served the image from cache.
    pub cached: bool,
}

impl ImageReport {
    /// Report for a received image.
    #[must_use]
    pub fn success(response: &HttpResponse, elapsed: Duration) -> Self {
        Self {
            url: response.url.clone(),
            success: true,
            bytes: response.body.len() as u64,
            duration: duration_millis(elapsed),
            cached: is_cache_hit(response),
        }
    }

    /// Report for an image that could not be fetched.
    #[must_use]
    pub fn failure(url: &str, elapsed: Duration) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            bytes: 0,
            duration: duration_millis(elapsed),
            cached: false,
        }
    }
}

/// Sends [`ImageReport`]s to the report endpoint.
#[derive(Debug, Clone)]
pub struct ImageReporter {
    executor: RequestExecutor,
    endpoint: String,
    key: EndpointKey,
}

impl ImageReporter {
    /// Creates a reporter posting to `endpoint`.
    ///
    /// Shares the throttle tracker and interrupt flag of `executor` but sends
    /// each report exactly once with `timeout`.
    #[must_use]
    pub fn new(executor: &RequestExecutor, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor: executor.with_policy(RetryPolicy::single_attempt(), timeout),
            endpoint: endpoint.into(),
            key: EndpointKey::new("POST /report"),
        }
    }

    /// Returns true if images from `image_url` should be reported.
    #[must_use]
    pub fn should_report(image_url: &str) -> bool {
        Url::parse(image_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| !host.ends_with(UNREPORTED_HOST_SUFFIX))
    }

    /// Sends `report`, logging (never returning) any failure.
    pub async fn send(&self, report: ImageReport) {
        if !Self::should_report(&report.url) {
            return;
        }

        let body = match serde_json::to_vec(&report) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "could not encode image report");
                return;
            }
        };

        match self
            .executor
            .execute(&self.key, &HttpRequest::post_json(&self.endpoint, body))
            .await
        {
            Ok(_) => debug!(url = %report.url, success = report.success, "image report sent"),
            Err(e) => warn!(url = %report.url, error = %e, "image report failed"),
        }
    }
}

fn is_cache_hit(response: &HttpResponse) -> bool {
    response
        .header(CACHE_STATUS_HEADER)
        .is_some_and(|value| value.trim_start().starts_with("HIT"))
}

#[allow(clippy::cast_possible_truncation)]
fn duration_millis(elapsed: Duration) -> u64 {
    elapsed.as_millis().min(u128::from(u64::MAX)) as u64
}
