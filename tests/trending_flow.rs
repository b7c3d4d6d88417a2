//! End-to-end tests: file-backed cache, real HTTP client, mock trending feed.

use gtrend::app::App;
use gtrend::cache::{FileStore, PersistentStore};
use gtrend::config::{Config, UpstreamConfig};
use gtrend::github::{Category, Since, TrendingClient};
use gtrend::trending::{Query, ServedFrom};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config {
        upstream: UpstreamConfig {
            base_url: server.uri(),
            max_retries: 0,
            ..UpstreamConfig::default()
        },
        ..Config::default()
    }
}

fn app_for(config: &Config, dir: &TempDir) -> App {
    App::new(config, Box::new(FileStore::new(dir.path()))).expect("app should build")
}

async fn mount_language(server: &MockServer, lang: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("language", lang))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fan_out_is_cached_on_disk() {
    let server = MockServer::start().await;
    mount_language(&server, "rust", json!([{"name": "r1", "added": 5}, {"name": "r2", "added": 50}])).await;
    mount_language(&server, "go", json!([{"name": "g1", "added": 20}])).await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server);
    let query = Query::new(["rust", "go"], Some(Since::Daily), Category::Repositories);

    let first = app_for(&config, &dir).fetch(&query).await.unwrap();
    assert_eq!(first.source, ServedFrom::Upstream);
    let names: Vec<String> = first.items.iter().map(|i| i.title()).collect();
    assert_eq!(names, vec!["r2", "g1", "r1"]);

    let keys = FileStore::new(dir.path()).list_keys().unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("GITHUBER_CACHE_trending_"));

    // A new process over the same store directory hits the persisted entry
    let second = app_for(&config, &dir).fetch(&query).await.unwrap();
    assert_eq!(second.source, ServedFrom::Cache);
    assert_eq!(second.items, first.items);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_upstream_outage_serves_raw_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let query = Query::new(["rust"], Some(Since::Monthly), Category::Repositories);
    FileStore::new(dir.path())
        .set(
            &query.raw_key().unwrap(),
            &json!({"repos": [{"name": "old", "added": 1}], "toMonth": 0}),
        )
        .unwrap();

    let app = app_for(&config_for(&server), &dir);
    let served = app.fetch(&query).await.unwrap();

    assert_eq!(served.source, ServedFrom::StaleFallback);
    assert_eq!(served.items[0].title(), "old");
    assert_eq!(app.state().current(), served.items);
}

#[tokio::test]
async fn test_upstream_outage_without_fallback_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let query = Query::new(["rust"], Some(Since::Daily), Category::Repositories);

    let result = app_for(&config_for(&server), &dir).fetch(&query).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_clear_empties_namespace_only() {
    let server = MockServer::start().await;
    mount_language(&server, "", json!([{"name": "any", "added": 3}])).await;
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path());
    store.set("unrelated", &json!(true)).unwrap();

    let app = app_for(&config_for(&server), &dir);
    let query = Query::all(Some(Since::Weekly), Category::Repositories);
    app.fetch(&query).await.unwrap();
    app.clear();

    assert_eq!(store.list_keys().unwrap(), vec!["unrelated".to_string()]);
    assert_eq!(app.stats().memory_items, 0);
    assert_eq!(app.fetch(&query).await.unwrap().source, ServedFrom::Upstream);
}

#[test]
fn test_client_builds_from_defaults() {
    assert!(TrendingClient::new(&UpstreamConfig::default()).is_ok());
}
