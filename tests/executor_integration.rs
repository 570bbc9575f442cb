//! Integration tests for the resilient request executor.
//!
//! These drive `RequestExecutor` over real HTTP against wiremock servers:
//! transient failures are retried, rate limits are waited out, fatal statuses
//! are returned after a single request.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mdex_core::download::{FailureCause, HttpRequest};
use mdex_core::{EndpointKey, ExecuteError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

mod support;
use support::fast_executor;
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

/// Fails the first `fail_count` requests with `status`, then returns 200.
struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    status: u16,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(self.status)
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}

/// Answers the first request with 429 and a reset one second out, then 200.
/// Records when each request arrived.
struct RateLimitResponder {
    arrivals: Arc<Mutex<Vec<SystemTime>>>,
    reset_at: Arc<Mutex<Option<u64>>>,
}

impl Respond for RateLimitResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now = SystemTime::now();
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.push(now);
        if arrivals.len() == 1 {
            let reset = now.duration_since(UNIX_EPOCH).unwrap().as_secs() + 2;
            *self.reset_at.lock().unwrap() = Some(reset);
            ResponseTemplate::new(429).insert_header("X-RateLimit-Retry-After", reset.to_string())
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried_until_success() {
    let mock_server = require_mock_server!();
    let request_count = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(FlakyResponder {
            request_count: Arc::clone(&request_count),
            fail_count: 2,
            status: 500,
        })
        .mount(&mock_server)
        .await;

    let executor = fast_executor(5);
    let key = EndpointKey::new("GET /flaky");
    let response = executor
        .execute(&key, &HttpRequest::get(format!("{}/flaky", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ok");
    assert_eq!(request_count.load(Ordering::SeqCst), 3);
    assert_eq!(executor.tracker().state(&key).consecutive_failures, 0);
}

#[tokio::test]
async fn test_rate_limit_reset_is_honored() {
    let mock_server = require_mock_server!();
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let reset_at = Arc::new(Mutex::new(None));
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(RateLimitResponder {
            arrivals: Arc::clone(&arrivals),
            reset_at: Arc::clone(&reset_at),
        })
        .mount(&mock_server)
        .await;

    let executor = fast_executor(1);
    let key = EndpointKey::new("GET /limited");
    let response = executor
        .execute(&key, &HttpRequest::get(format!("{}/limited", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 200, "a 429 does not consume the retry budget");
    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.len(), 2);
    let reset = UNIX_EPOCH + Duration::from_secs(reset_at.lock().unwrap().unwrap());
    assert!(
        arrivals[1] >= reset,
        "second request arrived before the advertised reset"
    );
}

#[tokio::test]
async fn test_not_found_is_fatal_after_one_request() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = fast_executor(5);
    let key = EndpointKey::new("GET /missing");
    let error = executor
        .execute(&key, &HttpRequest::get(format!("{}/missing", mock_server.uri())))
        .await
        .unwrap_err();

    match error {
        ExecuteError::Fatal { cause, .. } => assert_eq!(cause.http_status(), Some(404)),
        other => panic!("expected fatal error, got {other:?}"),
    }
    assert_eq!(executor.tracker().state(&key).consecutive_failures, 0);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_attempts() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let executor = fast_executor(3);
    let key = EndpointKey::new("GET /down");
    let error = executor
        .execute(&key, &HttpRequest::get(format!("{}/down", mock_server.uri())))
        .await
        .unwrap_err();

    match error {
        ExecuteError::Exhausted(exhausted) => {
            assert_eq!(exhausted.attempts, 3);
            assert!(matches!(
                exhausted.last_cause,
                FailureCause::Status { status: 503, .. }
            ));
        }
        other => panic!("expected exhausted error, got {other:?}"),
    }
    assert_eq!(executor.tracker().state(&key).consecutive_failures, 3);
}

#[tokio::test]
async fn test_buckets_are_independent() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let executor = fast_executor(2);
    let down = EndpointKey::new("GET /down");
    let up = EndpointKey::new("GET /up");
    let _ = executor
        .execute(&down, &HttpRequest::get(format!("{}/down", mock_server.uri())))
        .await;
    executor
        .execute(&up, &HttpRequest::get(format!("{}/up", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(executor.tracker().state(&down).consecutive_failures, 2);
    assert_eq!(executor.tracker().state(&up).consecutive_failures, 0);
    assert!(executor.tracker().may_request(&up));
}
