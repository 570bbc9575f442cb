//! Shared helpers for integration tests: socket guard, executor wiring, JSON fixtures.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::time::Duration;

use mdex_core::{ApiClient, RequestExecutor, RetryPolicy, ReqwestTransport, SystemClock, ThrottleTracker};
use serde_json::{Value, json};

/// Executor with millisecond backoff so retry tests stay fast.
pub fn fast_executor(max_attempts: u32) -> RequestExecutor {
    let tracker = Arc::new(ThrottleTracker::new(Arc::new(SystemClock)));
    let transport = Arc::new(ReqwestTransport::new("mdex-dl-tests").expect("http client"));
    RequestExecutor::new(
        transport,
        tracker,
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::from_millis(50),
        ),
        Duration::from_secs(5),
    )
}

/// API client rooted at the mock server.
pub fn api_client(server_uri: &str, max_attempts: u32, page_size: usize) -> ApiClient {
    ApiClient::new(Arc::new(fast_executor(max_attempts)), server_uri)
        .expect("mock server uri is a valid api root")
        .with_page_size(page_size)
}

pub fn manga_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "type": "manga",
        "attributes": { "title": { "en": title }, "altTitles": [] }
    })
}

pub fn chapter_json(id: &str, number: &str, language: &str, publish_at: &str) -> Value {
    json!({
        "id": id,
        "type": "chapter",
        "attributes": {
            "chapter": number,
            "title": null,
            "translatedLanguage": language,
            "externalUrl": null,
            "publishAt": publish_at,
            "pages": 5
        },
        "relationships": [{ "id": "group-1", "type": "scanlation_group" }]
    })
}

pub fn collection_json(data: Vec<Value>, offset: usize, limit: usize, total: usize) -> Value {
    json!({
        "result": "ok",
        "response": "collection",
        "data": data,
        "limit": limit,
        "offset": offset,
        "total": total
    })
}

pub fn entity_json(data: Value) -> Value {
    json!({ "result": "ok", "response": "entity", "data": data })
}

pub fn at_home_json(base_url: &str, hash: &str, files: &[&str]) -> Value {
    json!({
        "result": "ok",
        "baseUrl": base_url,
        "chapter": { "hash": hash, "data": files, "dataSaver": [] }
    })
}
