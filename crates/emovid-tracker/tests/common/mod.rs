/*
[INPUT]:  Mock processing service requirements
[OUTPUT]: Shared fixtures for tracker integration tests
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use emovid_adapter::{ClientConfig, EmovidClient, PayloadPolicy, VideoPayload};
use emovid_tracker::LifecycleConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn client_for(server: &MockServer) -> Arc<EmovidClient> {
    client_at(&server.uri())
}

/// Client with short timeouts against any base URL
pub fn client_at(base_url: &str) -> Arc<EmovidClient> {
    let config = ClientConfig {
        timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        probe_timeout: Duration::from_secs(1),
        ..ClientConfig::default()
    };
    Arc::new(EmovidClient::with_config_and_base_url(config, base_url).expect("client init"))
}

/// Base URL on which nothing listens: bind an ephemeral port, then release it
pub fn closed_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Fast cadence so loops finish within a test's lifetime
pub fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        poll_interval: POLL_INTERVAL,
        max_consecutive_failures: 3,
        payload_policy: PayloadPolicy::default(),
        require_liveness: true,
    }
}

pub fn mp4_payload(size: usize) -> VideoPayload {
    VideoPayload::from_bytes("interview.mp4", vec![1u8; size])
}

pub async fn mount_probe(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>docs</html>"))
        .mount(server)
        .await;
}

pub async fn mount_upload(server: &MockServer, task_id: &str) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": task_id })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Answer `times` status polls with `body`; earlier mounts are served first.
pub async fn mount_status(
    server: &MockServer,
    task_id: &str,
    body: serde_json::Value,
    times: u64,
) {
    Mock::given(method("GET"))
        .and(path(format!("/status/{task_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

pub async fn mount_status_error(server: &MockServer, task_id: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/status/{task_id}")))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream failure"))
        .mount(server)
        .await;
}

pub async fn status_requests(server: &MockServer, task_id: &str) -> usize {
    let status_path = format!("/status/{task_id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == status_path)
        .count()
}
