//! Integration tests for the download orchestrator.
//!
//! A wiremock server plays both the API (page manifests) and the image CDN.
//! Files land in temporary directories.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};
use mdex_core::download::{DownloadOptions, PageOutcome};
use mdex_core::{
    ApiClient, Chapter, ChapterRecord, ChapterStatus, DownloadOrchestrator, ImageReporter,
    build_catalog,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::{at_home_json, fast_executor};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

const PAGES: [&str; 5] = ["1-a.png", "2-b.png", "3-c.png", "4-d.png", "5-e.png"];

fn record(id: &str, number: &str) -> ChapterRecord {
    ChapterRecord {
        id: id.to_string(),
        number: Some(number.to_string()),
        title: None,
        language: "en".to_string(),
        published_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
        group_ids: Vec::new(),
        pages: 5,
        external_url: None,
    }
}

fn chapters(records: &[ChapterRecord]) -> Vec<Chapter> {
    build_catalog(records, "en")
}

fn orchestrator(server: &MockServer, root: &Path, with_reports: bool) -> DownloadOrchestrator {
    let executor = fast_executor(2);
    let reporter = with_reports.then(|| {
        ImageReporter::new(
            &executor,
            format!("{}/report", server.uri()),
            Duration::from_secs(2),
        )
    });
    let api = ApiClient::new(Arc::new(executor), &server.uri()).unwrap();
    let options = DownloadOptions {
        save_root: root.to_path_buf(),
        concurrency_limit: 2,
        ..DownloadOptions::default()
    };
    DownloadOrchestrator::new(api, reporter, options).unwrap()
}

async fn mount_manifest(server: &MockServer, chapter_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/at-home/server/{chapter_id}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(at_home_json(&server.uri(), "hash", &PAGES)),
        )
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, file: &str, status: u16, expected: u64) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_bytes(format!("image {file}").into_bytes())
    } else {
        ResponseTemplate::new(status)
    };
    Mock::given(method("GET"))
        .and(path(format!("/data/hash/{file}")))
        .respond_with(template)
        .expect(expected)
        .mount(server)
        .await;
}

fn saved_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_failed_page_leaves_partial_chapter_then_retry_completes_it() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();

    mount_manifest(&mock_server, "c1").await;
    for file in PAGES {
        if file.starts_with('3') {
            mount_page(&mock_server, file, 500, 2).await;
        } else {
            mount_page(&mock_server, file, 200, 1).await;
        }
    }
    Mock::given(method("POST"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(200))
        .expect(5)
        .mount(&mock_server)
        .await;

    let engine = orchestrator(&mock_server, dir.path(), true);
    let chapter = chapters(&[record("c1", "1")]).remove(0);

    let first = engine.download_chapter("Some Title", &chapter).await;

    assert_eq!(first.status, ChapterStatus::Partial { missing: vec![3] });
    assert_eq!(first.missing_pages(), vec![3]);
    assert_eq!(first.directory, dir.path().join("Some Title").join("Ch. 1"));
    assert_eq!(
        saved_files(&first.directory),
        vec!["1.png", "2.png", "4.png", "5.png"]
    );
    assert_eq!(
        std::fs::read(first.directory.join("2.png")).unwrap(),
        b"image 2-b.png"
    );
    mock_server.verify().await;

    // Second round: page 3 now succeeds and is the only image fetched.
    mock_server.reset().await;
    mount_manifest(&mock_server, "c1").await;
    for file in PAGES {
        let expected = u64::from(file.starts_with('3'));
        mount_page(&mock_server, file, 200, expected).await;
    }

    let engine = orchestrator(&mock_server, dir.path(), false);
    let retried = engine.retry_pages("Some Title", &chapter, &[3]).await;

    assert!(retried.is_complete(), "got {:?}", retried.status);
    assert_eq!(retried.pages.len(), 1);
    assert_eq!(retried.pages[0].page, 3);
    assert_eq!(
        saved_files(&retried.directory),
        vec!["1.png", "2.png", "3.png", "4.png", "5.png"]
    );
    mock_server.verify().await;
}

#[tokio::test]
async fn test_rerun_fetches_nothing_when_chapter_is_on_disk() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    mount_manifest(&mock_server, "c1").await;
    for file in PAGES {
        mount_page(&mock_server, file, 200, 1).await;
    }

    let chapter = chapters(&[record("c1", "1")]).remove(0);
    let first = orchestrator(&mock_server, dir.path(), false)
        .download_chapter("Title", &chapter)
        .await;
    assert!(first.is_complete());
    assert_eq!(first.bytes_written(), 5 * "image 1-a.png".len() as u64);

    let again = orchestrator(&mock_server, dir.path(), false);
    let second = again.download_chapter("Title", &chapter).await;

    assert!(second.is_complete());
    assert!(
        second
            .pages
            .iter()
            .all(|page| matches!(page.outcome, PageOutcome::Saved { reused: true, .. }))
    );
    assert_eq!(again.stats().reused(), 5);
    assert_eq!(again.stats().downloaded(), 0);
    // Each image mock expects exactly one request across both runs.
    mock_server.verify().await;
}

#[tokio::test]
async fn test_one_failing_chapter_does_not_stop_the_others() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    mount_manifest(&mock_server, "good").await;
    Mock::given(method("GET"))
        .and(path("/at-home/server/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    for file in PAGES {
        mount_page(&mock_server, file, 200, 1).await;
    }

    let catalog = chapters(&[record("gone", "1"), record("good", "2")]);
    let report = orchestrator(&mock_server, dir.path(), false)
        .download_all("Title", &catalog, |_| {})
        .await;

    assert_eq!(report.chapters.len(), 2);
    assert!(matches!(
        report.chapters[0].status,
        ChapterStatus::Failed { .. }
    ));
    assert!(report.chapters[1].is_complete());
    assert!(!report.is_complete());
    assert!(report.to_string().contains("0 partial, 1 failed"));
}

#[tokio::test]
async fn test_directory_claimed_by_other_chapter_is_not_overwritten() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/at-home/server/newcomer"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let chapter_dir = dir.path().join("Title").join("Ch. 1");
    std::fs::create_dir_all(&chapter_dir).unwrap();
    std::fs::write(chapter_dir.join(".chapter-id"), "previous").unwrap();

    let chapter = chapters(&[record("newcomer", "1")]).remove(0);
    let result = orchestrator(&mock_server, dir.path(), false)
        .download_chapter("Title", &chapter)
        .await;

    match &result.status {
        ChapterStatus::Failed { reason } => {
            assert!(reason.contains("previous"), "got: {reason}");
        }
        other => panic!("expected collision failure, got {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(chapter_dir.join(".chapter-id")).unwrap(),
        "previous"
    );
}

#[tokio::test]
async fn test_empty_manifest_fails_chapter() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/at-home/server/blank"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(at_home_json(&mock_server.uri(), "hash", &[])),
        )
        .mount(&mock_server)
        .await;

    let chapter = chapters(&[record("blank", "1")]).remove(0);
    let result = orchestrator(&mock_server, dir.path(), false)
        .download_chapter("Title", &chapter)
        .await;

    assert!(matches!(result.status, ChapterStatus::Failed { .. }));
    assert!(result.pages.is_empty());
}

#[tokio::test]
async fn test_retry_that_fails_again_keeps_chapter_partial() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    mount_manifest(&mock_server, "c1").await;
    for file in PAGES {
        let status = if file.starts_with('3') { 500 } else { 200 };
        let expected = if file.starts_with('3') { 4 } else { 1 };
        mount_page(&mock_server, file, status, expected).await;
    }

    let chapter = chapters(&[record("c1", "1")]).remove(0);
    let first = orchestrator(&mock_server, dir.path(), false)
        .download_chapter("Title", &chapter)
        .await;
    assert_eq!(first.status, ChapterStatus::Partial { missing: vec![3] });

    let retried = orchestrator(&mock_server, dir.path(), false)
        .retry_pages("Title", &chapter, &[3])
        .await;

    assert_eq!(retried.status, ChapterStatus::Partial { missing: vec![3] });
    assert_eq!(retried.missing_pages(), vec![3]);
    assert_eq!(retried.pages.len(), 1);
    assert_eq!(
        saved_files(&retried.directory),
        vec!["1.png", "2.png", "4.png", "5.png"]
    );
    mock_server.verify().await;
}

#[tokio::test]
async fn test_rate_limited_report_endpoint_does_not_hold_up_chapter() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    mount_manifest(&mock_server, "c1").await;
    for file in PAGES {
        mount_page(&mock_server, file, 200, 1).await;
    }
    let reset = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 60;
    Mock::given(method("POST"))
        .and(path("/report"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("X-RateLimit-Retry-After", reset.to_string()),
        )
        .mount(&mock_server)
        .await;

    let chapter = chapters(&[record("c1", "1")]).remove(0);
    let started = Instant::now();
    let download = orchestrator(&mock_server, dir.path(), true)
        .download_chapter("Title", &chapter)
        .await;

    assert!(download.is_complete(), "got {:?}", download.status);
    assert!(
        started.elapsed() < Duration::from_secs(20),
        "chapter waited on the report endpoint: {:?}",
        started.elapsed()
    );
    mock_server.verify().await;
}

#[tokio::test]
async fn test_empty_image_body_fails_only_that_page() {
    let mock_server = require_mock_server!();
    let dir = TempDir::new().unwrap();
    mount_manifest(&mock_server, "c1").await;
    for file in PAGES {
        if file.starts_with('2') {
            Mock::given(method("GET"))
                .and(path(format!("/data/hash/{file}")))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&mock_server)
                .await;
        } else {
            mount_page(&mock_server, file, 200, 1).await;
        }
    }

    let chapter = chapters(&[record("c1", "1")]).remove(0);
    let download = orchestrator(&mock_server, dir.path(), false)
        .download_chapter("Title", &chapter)
        .await;

    assert_eq!(download.status, ChapterStatus::Partial { missing: vec![2] });
    match &download.pages[1].outcome {
        PageOutcome::Failed { cause } => assert!(cause.contains("empty image body"), "got: {cause}"),
        other => panic!("expected failed page, got {other:?}"),
    }
    assert!(!download.directory.join("2.png").exists());
    mock_server.verify().await;
}
