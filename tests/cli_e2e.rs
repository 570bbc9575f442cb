//! End-to-end CLI tests for the mdex-dl binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use std::path::Path;

use assert_cmd::Command;
use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::should_skip_socket_bound_test;
use support::{at_home_json, chapter_json, collection_json, entity_json, manga_json};

fn write_config(config_home: &Path, contents: &str) {
    let config_dir = config_home.join("mdex-dl");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

fn mdex_dl(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mdex-dl").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("mdex-dl").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download manga chapters"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("random"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("mdex-dl").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mdex-dl"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let mut cmd = Command::cargo_bin("mdex-dl").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_invalid_selection_is_rejected_before_any_request() {
    let config_home = TempDir::new().unwrap();
    mdex_dl(config_home.path())
        .args(["download", "some-id", "--select", "5-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("start must not exceed end"));
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let config_home = TempDir::new().unwrap();
    write_config(config_home.path(), "concurency = 4\n");

    mdex_dl(config_home.path())
        .args(["download", "some-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key: 'concurency'"));
}

#[test]
fn test_invalid_config_value_is_reported_by_field() {
    let config_home = TempDir::new().unwrap();
    write_config(config_home.path(), "page_size = 0\nmax_title_length = 0\n");

    mdex_dl(config_home.path())
        .args(["search", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("`page_size`"))
        .stderr(predicate::str::contains("`max_title_length`"));
}

async fn mount_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/manga/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entity_json(manga_json("m1", "Yotsuba"))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/manga/m1/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(collection_json(
            vec![
                chapter_json("c1", "1", "en", "2020-01-01T00:00:00+00:00"),
                chapter_json("c2", "2", "en", "2020-02-01T00:00:00+00:00"),
                chapter_json("c2-fr", "2", "fr", "2020-02-01T00:00:00+00:00"),
            ],
            0,
            100,
            3,
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/at-home/server/c2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(at_home_json(&server.uri(), "h2", &["1-x.jpg", "2-y.jpg"])),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/at-home/server/c1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/data/h2/.+\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .expect(2)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "ok" })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_selected_chapter_end_to_end() {
    if should_skip_socket_bound_test() {
        return;
    }
    let server = MockServer::start().await;
    mount_api(&server).await;

    let config_home = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_config(
        config_home.path(),
        &format!(
            "api_root = \"{uri}\"\nreport_endpoint = \"{uri}/report\"\nbackoff_factor = 0.01\n",
            uri = server.uri()
        ),
    );

    let mut cmd = mdex_dl(config_home.path());
    cmd.args(["-q", "download", "m1", "--select", "2", "--output"])
        .arg(output.path());
    let result = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .unwrap();

    result
        .assert()
        .success()
        .stdout(predicate::str::contains("Yotsuba: 1 complete, 0 partial, 0 failed"));
    let chapter_dir = output.path().join("Yotsuba").join("Ch. 2");
    assert_eq!(std::fs::read(chapter_dir.join("1.jpg")).unwrap(), b"jpeg");
    assert!(chapter_dir.join("2.jpg").exists());
    assert!(!output.path().join("Yotsuba").join("Ch. 1").exists());
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_search_lists_ids_and_titles() {
    if should_skip_socket_bound_test() {
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga"))
        .respond_with(ResponseTemplate::new(200).set_body_json(collection_json(
            vec![manga_json("m1", "Yotsuba"), manga_json("m2", "Yotsuba Extra")],
            0,
            10,
            2,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config_home = TempDir::new().unwrap();
    write_config(config_home.path(), &format!("api_root = \"{}\"\n", server.uri()));

    let mut cmd = mdex_dl(config_home.path());
    cmd.args(["-q", "search", "yotsuba"]);
    let result = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .unwrap();

    result
        .assert()
        .success()
        .stdout(predicate::str::contains("m1  Yotsuba"))
        .stdout(predicate::str::contains("m2  Yotsuba Extra"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_random_prints_one_manga() {
    if should_skip_socket_bound_test() {
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga/random"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(entity_json(manga_json("m7", "Lucky Pick"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config_home = TempDir::new().unwrap();
    write_config(config_home.path(), &format!("api_root = \"{}\"\n", server.uri()));

    let mut cmd = mdex_dl(config_home.path());
    cmd.args(["-q", "random"]);
    let result = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .unwrap();

    result
        .assert()
        .success()
        .stdout(predicate::str::contains("m7  Lucky Pick"));
    server.verify().await;
}
