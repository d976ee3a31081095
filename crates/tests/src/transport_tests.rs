//! Integration tests for the HTTP transport's proxy forwarding.

use crate::mock_infrastructure::{fast_settings, http_explorer_with_transport, RpcMockBuilder};
use explorer_core::{
    provider::{transport::TARGET_URL_HEADER, HttpTransportConfig, TransportError},
    test_utils::status_json,
    RpcError,
};
use mockito::Matcher;
use serde_json::json;

const REAL_ENDPOINT: &str = "https://rpc.example.test";

#[tokio::test]
async fn test_requests_are_forwarded_with_target_header() {
    let mut proxy = RpcMockBuilder::new().await;
    let forwarded = proxy
        .get_server()
        .mock("POST", "/")
        .match_header(TARGET_URL_HEADER, REAL_ENDPOINT)
        .match_body(Matcher::Regex(r#""method"\s*:\s*"status""#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": status_json(55) }).to_string())
        .expect(1)
        .create();

    let transport =
        HttpTransportConfig { proxy_url: Some(proxy.url().parse().unwrap()), ..Default::default() };
    let (explorer, _) = http_explorer_with_transport(&[REAL_ENDPOINT], transport, fast_settings());

    let status = explorer.get_status().await.unwrap();
    assert_eq!(status.latest_block_height, 55);
    forwarded.assert();
}

#[tokio::test]
async fn test_unreachable_proxy_is_a_proxy_error() {
    let transport = HttpTransportConfig {
        proxy_url: Some("http://127.0.0.1:9/".parse().unwrap()),
        ..Default::default()
    };
    let (explorer, _) = http_explorer_with_transport(&[REAL_ENDPOINT], transport, fast_settings());

    match explorer.get_status().await {
        Err(RpcError::AllProvidersFailed { last_error, attempts, .. }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(last_error, TransportError::Proxy(_)));
        }
        other => panic!("expected AllProvidersFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_body_is_retried() {
    let mut node = RpcMockBuilder::new().await;
    let garbage = node
        .get_server()
        .mock("POST", "/")
        .with_status(200)
        .with_body("<html>captive portal</html>")
        .expect(3)
        .create();

    let (explorer, _) = http_explorer_with_transport(
        &[node.url().as_str()],
        HttpTransportConfig::default(),
        fast_settings(),
    );

    match explorer.get_status().await {
        Err(RpcError::AllProvidersFailed { last_error, .. }) => {
            assert!(matches!(last_error, TransportError::InvalidResponse(_)));
        }
        other => panic!("expected AllProvidersFailed, got {other:?}"),
    }
    garbage.assert();
}
