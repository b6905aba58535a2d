use std::sync::Arc;

use serde_json::json;
use vodhub::config::Settings;
use vodhub::health::{HealthPolicy, HealthProbe, ProbeVerdict, SiteProbe};
use vodhub::http::{HttpClients, API_PATH};
use vodhub::storage::{JsonStore, SiteStore};
use vodhub::types::{CheckStatus, HealthStatus, Site};
use vodhub::VodHub;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> Settings {
    Settings { request_timeout_secs: 1, ..Settings::default() }
}

fn probe() -> HealthProbe {
    HealthProbe::new(HttpClients::new(&settings()).unwrap())
}

async fn server_answering(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path(API_PATH)).respond_with(template).mount(&server).await;
    server
}

#[tokio::test]
async fn disabled_site_is_healthy_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let mut site = Site::new(1, "Off", server.uri());
    site.enabled = false;

    assert_eq!(probe().probe(&site).await, ProbeVerdict::Healthy);
}

#[tokio::test]
async fn healthy_only_on_code_one() {
    let ok = server_answering(ResponseTemplate::new(200).set_body_json(json!({"code": "1", "list": []}))).await;
    assert_eq!(probe().probe(&Site::new(1, "Ok", ok.uri())).await, ProbeVerdict::Healthy);

    let rejected = server_answering(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": "closed"}))).await;
    assert!(matches!(probe().probe(&Site::new(2, "Closed", rejected.uri())).await, ProbeVerdict::Unhealthy(_)));

    let broken = server_answering(ResponseTemplate::new(502)).await;
    assert!(matches!(probe().probe(&Site::new(3, "Broken", broken.uri())).await, ProbeVerdict::Unhealthy(_)));
}

#[tokio::test]
async fn redirect_loop_counts_as_a_failed_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", API_PATH))
        .mount(&server)
        .await;
    let mut site = Site::new(1, "Loop", server.uri());

    let verdict = probe().probe(&site).await;
    assert!(matches!(verdict, ProbeVerdict::Unhealthy(_)), "{verdict:?}");

    let result = HealthPolicy::default().apply(&mut site, &verdict);
    assert_eq!(result.status, HealthStatus::Failed);
    assert_eq!(site.consecutive_errors, 1);
    assert_eq!(site.check_status, CheckStatus::Failed);
    assert!(site.last_check.is_some());
}

#[tokio::test]
async fn unreachable_site_is_unhealthy() {
    let uri = closed_port_uri();

    let verdict = probe().probe(&Site::new(1, "Gone", uri)).await;
    assert!(matches!(verdict, ProbeVerdict::Unhealthy(_)), "{verdict:?}");
}

#[tokio::test]
async fn unparseable_url_is_an_error_without_bookkeeping() {
    let mut site = Site::new(1, "Bad", "http://bad host.example");
    let verdict = probe().probe(&site).await;
    assert!(matches!(verdict, ProbeVerdict::Error(_)), "{verdict:?}");

    let before = site.clone();
    let result = HealthPolicy::default().apply(&mut site, &verdict);
    assert_eq!(result.status, HealthStatus::Error);
    assert_eq!(site, before);
}

#[tokio::test]
async fn repeated_failures_disable_the_site() {
    let ok = server_answering(ResponseTemplate::new(200).set_body_json(json!({"code": 1}))).await;
    let down = server_answering(ResponseTemplate::new(500)).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::open(dir.path()).await.unwrap());
    store.save_sites(&[Site::new(1, "Up", ok.uri()), Site::new(2, "Down", down.uri())]).await.unwrap();
    let settings = Settings { failure_threshold: 2, ..settings() };
    let hub = VodHub::with_store(settings, store.clone()).await.unwrap();

    let first = hub.check_sites_now(false).await.unwrap();
    assert_eq!(first.iter().map(|r| r.status).collect::<Vec<_>>(), vec![HealthStatus::Success, HealthStatus::Failed]);
    let second = hub.check_site(2).await.unwrap();
    assert!(second.message.contains("site disabled"));

    let saved = store.get_sites().await.unwrap();
    assert_eq!(saved[0].check_status, CheckStatus::Success);
    assert!(!saved[1].enabled);
    assert_eq!(saved[1].consecutive_errors, 2);

    // Disabled sites drop out of the default check.
    assert_eq!(hub.check_sites_now(false).await.unwrap().len(), 1);
}

/// Address nothing listens on: bind an ephemeral port, then release it.
fn closed_port_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
