//! Integration tests for the worker over real HTTP.
//!
//! Uses wiremock for the network side and a disk store in a temp directory.
//! The mock server stands in for the deployment host; its `/CNT/` subtree is
//! the managed scope.

use std::sync::Arc;
use std::time::Duration;

use netfirst_core::{
    BootOutcome, CacheStorage, Config, DiskStorage, HttpFetcher, Interception, Manifest, Request,
    ResponseSource, Retrieval, SeedReport, Worker,
};
use reqwest::header;
use reqwest::StatusCode;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, version: &str, store_dir: &std::path::Path) -> Config {
    Config {
        version: version.to_string(),
        app_url: format!("{}/CNT/", server.uri()),
        manifest: Manifest::new(vec!["./index.html".to_string()]),
        storage_dir: Some(store_dir.to_path_buf()),
        ..Config::default()
    }
}

fn create_worker(config: &Config) -> Worker {
    let storage = DiskStorage::new(config.storage_dir().unwrap()).expect("failed to open store");
    let fetcher =
        HttpFetcher::with_timeout(config.request_timeout()).expect("failed to build fetcher");
    Worker::new(
        config.worker_settings().expect("invalid config"),
        Arc::new(storage),
        Arc::new(fetcher),
    )
}

async fn mount_index(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/CNT/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

fn respond(interception: Interception) -> Retrieval {
    match interception {
        Interception::Respond(retrieval) => retrieval,
        Interception::PassThrough(request) => panic!("unexpected pass-through for {}", request.url),
    }
}

#[tokio::test]
async fn test_boot_seeds_manifest_from_network() {
    let server = MockServer::start().await;
    mount_index(&server, "<html>seeded</html>").await;
    let dir = tempfile::tempdir().unwrap();

    let worker = create_worker(&config_for(&server, "cnt-v3", dir.path()));
    match worker.boot().await {
        BootOutcome::Fresh(install, _) => {
            assert_eq!(install.seed, SeedReport::Seeded { entries: 1 })
        }
        other => panic!("expected fresh install, got {:?}", other),
    }
}

#[tokio::test]
async fn test_managed_request_is_fetched_and_written_back() {
    let server = MockServer::start().await;
    mount_index(&server, "<html>live</html>").await;
    Mock::given(method("GET"))
        .and(path("/CNT/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, "cnt-v3", dir.path());

    let worker = create_worker(&config);
    worker.boot().await;

    let url = Url::parse(&format!("{}/CNT/app.js", server.uri())).unwrap();
    let retrieval = respond(worker.on_intercept(Request::get(url.clone())).await);
    assert_eq!(retrieval.source, ResponseSource::Network);
    assert_eq!(retrieval.response.text(), "console.log(1)");
    retrieval.write_back.expect("expected write-back").settled().await;

    let storage = DiskStorage::new(config.storage_dir().unwrap()).unwrap();
    let entries = storage.entries("cnt-v3").await.unwrap();
    assert!(entries.iter().any(|(key, _)| *key == Request::get(url.clone()).key()));
}

#[tokio::test]
async fn test_server_errors_are_passed_through() {
    let server = MockServer::start().await;
    mount_index(&server, "<html></html>").await;
    Mock::given(method("GET"))
        .and(path("/CNT/broken.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let worker = create_worker(&config_for(&server, "cnt-v3", dir.path()));
    worker.boot().await;

    let url = Url::parse(&format!("{}/CNT/broken.json", server.uri())).unwrap();
    let retrieval = respond(worker.on_intercept(Request::get(url)).await);
    assert_eq!(retrieval.source, ResponseSource::Network);
    assert_eq!(retrieval.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(retrieval.write_back.is_none());
}

#[tokio::test]
async fn test_sibling_path_is_not_intercepted() {
    let server = MockServer::start().await;
    mount_index(&server, "<html></html>").await;
    Mock::given(method("GET"))
        .and(path("/other-app/data.json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let worker = create_worker(&config_for(&server, "cnt-v3", dir.path()));
    worker.boot().await;

    let url = Url::parse(&format!("{}/other-app/data.json", server.uri())).unwrap();
    assert!(matches!(
        worker.on_intercept(Request::get(url)).await,
        Interception::PassThrough(_)
    ));
}

#[tokio::test]
async fn test_offline_falls_back_to_seeded_page() {
    let server = MockServer::start().await;
    mount_index(&server, "<html>seeded</html>").await;
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        request_timeout_secs: Some(1),
        ..config_for(&server, "cnt-v3", dir.path())
    };
    let index = Url::parse(&format!("{}/CNT/index.html", server.uri())).unwrap();
    let missing = Url::parse(&format!("{}/CNT/never-seen.html", server.uri())).unwrap();

    let worker = create_worker(&config);
    worker.boot().await;

    // From here on every request times out
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let page = Request::get(index).with_accept("text/html");
    let retrieval = respond(worker.on_intercept(page).await);
    assert_eq!(retrieval.source, ResponseSource::Store);
    assert_eq!(retrieval.response.text(), "<html>seeded</html>");
    assert_eq!(retrieval.response.content_type(), Some("text/html"));

    let unseen = Request::get(missing).with_accept("text/html");
    let retrieval = respond(worker.on_intercept(unseen).await);
    assert_eq!(retrieval.source, ResponseSource::Synthetic);
    assert_eq!(
        retrieval.response.header_str(&header::CACHE_CONTROL),
        Some("no-store")
    );
}

#[tokio::test]
async fn test_version_bump_discards_previous_store() {
    let server = MockServer::start().await;
    mount_index(&server, "<html></html>").await;
    let dir = tempfile::tempdir().unwrap();

    create_worker(&config_for(&server, "cnt-v3", dir.path())).boot().await;
    create_worker(&config_for(&server, "cnt-v4", dir.path())).boot().await;

    let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
    let names = storage.list_names().await.unwrap();
    assert_eq!(names, vec!["cnt-v4"]);
}
