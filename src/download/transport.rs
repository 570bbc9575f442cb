//! HTTP transport seam used by the request executor.
//!
//! The executor only needs "send this request, give me a status, headers and
//! body". [`Transport`] captures that so tests can script responses without a
//! network, while [`ReqwestTransport`] is the production implementation.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::{TransportError, TransportErrorKind};

/// A request description that can be sent any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including query string.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A `GET` request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A `POST` request for `url` with a JSON body.
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }
}

/// A fully received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The URL that was requested.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// An empty response with `status`.
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header (name is lowercased).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends one request and returns the complete response.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Sends `request`, failing if no response arrives within `timeout`.
    ///
    /// Non-success statuses are returned as responses, not errors.
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport sending `user_agent` on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| {
                TransportError::new("", TransportErrorKind::InvalidRequest, e.to_string())
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, &url).timeout(timeout);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, &e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(&url)
            } else {
                TransportError::new(&url, TransportErrorKind::Body, e.to_string())
            }
        })?;

        debug!(status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            url,
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

fn map_reqwest_error(url: &str, error: &reqwest::Error) -> TransportError {
    let message = error.to_string();
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_tls_error(error) {
        TransportErrorKind::Tls
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_builder() {
        TransportErrorKind::InvalidRequest
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(url, kind, message)
}

/// Certificate problems surface as connect errors; the message is the only signal.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(error);
    while let Some(current) = source {
        let text = current.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls handshake") {
            return true;
        }
        source = current.source();
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new("u", 200).with_header("X-Cache", "HIT, MISS");
        assert_eq!(response.header("x-cache"), Some("HIT, MISS"));
        assert_eq!(response.header("X-CACHE"), Some("HIT, MISS"));
        assert_eq!(response.header("missing"), None);
    }

    #[test]
    fn test_json_decodes_body() {
        let response = HttpResponse::new("u", 200).with_body(br#"{"result":"ok"}"#.to_vec());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["result"], "ok");
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let request = HttpRequest::post_json("https://report.example", b"{}".to_vec());
        assert_eq!(request.method, Method::POST);
        assert!(
            request
                .headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "application/json")
        );
    }

    #[test]
    fn test_invalid_url_is_an_invalid_request() {
        let transport = ReqwestTransport::new("mdex-dl-test").unwrap();
        let error = tokio_test::block_on(
            transport.send(HttpRequest::get("not-a-valid-url"), Duration::from_secs(1)),
        )
        .unwrap_err();
        assert_eq!(error.kind, TransportErrorKind::InvalidRequest);
        assert_eq!(error.url, "not-a-valid-url");
    }

    #[tokio::test]
    async fn test_reqwest_transport_connect_failure_is_classified() {
        let transport = ReqwestTransport::new("mdex-dl-test").unwrap();
        // Port 9 (discard) on localhost is almost never listening.
        let result = transport
            .send(
                HttpRequest::get("http://127.0.0.1:9/nothing"),
                Duration::from_secs(5),
            )
            .await;
        let error = result.unwrap_err();
        assert!(
            matches!(
                error.kind,
                TransportErrorKind::Connect | TransportErrorKind::Other | TransportErrorKind::Timeout
            ),
            "unexpected kind: {:?}",
            error.kind
        );
    }
}
