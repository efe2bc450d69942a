/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for emovid-adapter tests

use emovid_adapter::{ClientConfig, EmovidClient, VideoPayload};
use std::time::Duration;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Client pointed at the mock server
pub fn client_for(server: &MockServer) -> EmovidClient {
    EmovidClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
        .expect("client init")
}

/// Base URL on which nothing listens: bind an ephemeral port, then release it
pub fn closed_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Client with short timeouts for failure-path tests
#[allow(dead_code)]
pub fn fast_failing_client(base_url: &str) -> EmovidClient {
    let config = ClientConfig {
        timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        probe_timeout: Duration::from_secs(1),
        ..ClientConfig::default()
    };
    EmovidClient::with_config_and_base_url(config, base_url).expect("client init")
}

/// A valid mp4 payload of the given size
pub fn mp4_payload(size: usize) -> VideoPayload {
    VideoPayload::from_bytes("sample.mp4", vec![0u8; size])
}
