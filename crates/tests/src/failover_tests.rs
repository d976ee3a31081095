//! Integration tests for retry, rotation and error classification over real HTTP.
//!
//! Every test talks to mockito servers through `HttpTransport`, so status codes, bodies
//! and connection failures go through the same decoding path as production traffic.

use crate::mock_infrastructure::{fast_settings, http_explorer, RpcMockBuilder, UNREACHABLE_URL};
use explorer_core::{
    provider::{FailoverEvent, TransportError},
    BlockId, RpcError,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn test_all_providers_failing_reports_every_attempt() {
    let mut first = RpcMockBuilder::new().await;
    let mut second = RpcMockBuilder::new().await;
    let first_mock = first.mock_http_error(503, 3);
    let second_mock = second.mock_http_error(503, 3);

    let (explorer, providers) =
        http_explorer(&[first.url().as_str(), second.url().as_str()], fast_settings());

    let err = explorer.get_status().await.unwrap_err();
    match err {
        RpcError::AllProvidersFailed { attempts, tried, last_error, .. } => {
            assert_eq!(attempts, 6);
            assert_eq!(tried, vec![providers[0].id.clone(), providers[1].id.clone()]);
            assert!(matches!(last_error, TransportError::Http { status: 503, .. }));
        }
        other => panic!("expected AllProvidersFailed, got {other:?}"),
    }

    first_mock.assert();
    second_mock.assert();
    for provider in &providers {
        let health = explorer.provider_health(&provider.id).unwrap();
        assert!(!health.is_healthy);
    }
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    let mut first = RpcMockBuilder::new().await;
    let mut second = RpcMockBuilder::new().await;
    let error_mock =
        first.mock_rpc_error("block", 200, -32000, "params.block_id must be greater than 0", 1);
    let untouched = second.mock_http_error(503, 0);

    let (explorer, providers) =
        http_explorer(&[first.url().as_str(), second.url().as_str()], fast_settings());

    let err = explorer.get_block(&BlockId::Height(0)).await.unwrap_err();
    match &err {
        RpcError::Application(e) => {
            assert_eq!(e.code, -32000);
            assert!(e.message.contains("must be greater than 0"));
        }
        other => panic!("expected Application error, got {other:?}"),
    }

    error_mock.assert();
    untouched.assert();
    // The node answered, so it is reachable.
    assert!(explorer.provider_health(&providers[0].id).unwrap().is_healthy);
    assert_eq!(explorer.get_current_provider_info().unwrap().provider.id, providers[0].id);
}

#[tokio::test]
async fn test_error_envelope_on_http_500_is_an_application_error() {
    let mut node = RpcMockBuilder::new().await;
    let error_mock = node.mock_rpc_error("status", 500, -32603, "Internal error", 1);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());

    assert!(matches!(explorer.get_status().await, Err(RpcError::Application(_))));
    error_mock.assert();
}

#[tokio::test]
async fn test_failover_switches_then_rotation_wraps() {
    let mut good = RpcMockBuilder::new().await;
    good.mock_status(4_242);

    let events = Arc::new(Mutex::new(Vec::new()));
    let (explorer, providers) =
        http_explorer(&[UNREACHABLE_URL, good.url().as_str()], fast_settings());
    let sink = events.clone();
    let _subscription = explorer.on_failover_event(move |event| sink.lock().push(event.clone()));

    let status = explorer.get_status().await.unwrap();
    assert_eq!(status.latest_block_height, 4_242);

    // Rotation moves one past the provider that answered, wrapping to the first.
    let current = explorer.get_current_provider_info().unwrap();
    assert_eq!(current.provider.id, providers[0].id);
    assert_eq!(current.position, 0);
    assert_eq!(current.total, 2);

    let switched: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            FailoverEvent::ProviderSwitched { from, to, .. } => Some((from.clone(), to.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(switched, vec![(providers[0].id.clone(), providers[1].id.clone())]);

    // The next call starts at the unreachable provider again and fails over once more.
    events.lock().clear();
    explorer.get_status().await.unwrap();
    assert_eq!(
        events
            .lock()
            .iter()
            .filter(|event| matches!(event, FailoverEvent::ProviderSwitched { .. }))
            .count(),
        1
    );
    assert!(!explorer.provider_health(&providers[0].id).unwrap().is_healthy);
    assert!(explorer.provider_health(&providers[1].id).unwrap().is_healthy);
}

#[tokio::test]
async fn test_disabling_every_provider_fails_fast() {
    let (explorer, _) = http_explorer(&[UNREACHABLE_URL], fast_settings());
    assert_eq!(explorer.disable_all_providers().unwrap(), 1);

    let err = explorer.get_latest_block().await.unwrap_err();
    assert!(matches!(err, RpcError::NoProvidersAvailable { .. }));
}

#[tokio::test]
async fn test_selected_provider_is_tried_first() {
    let mut first = RpcMockBuilder::new().await;
    let mut second = RpcMockBuilder::new().await;
    let first_mock = first.mock_http_error(503, 0);
    second.mock_status(7);

    let (explorer, providers) =
        http_explorer(&[first.url().as_str(), second.url().as_str()], fast_settings());
    explorer.select_provider(&providers[1].id).unwrap();

    assert_eq!(explorer.get_status().await.unwrap().latest_block_height, 7);
    first_mock.assert();
}

#[tokio::test]
async fn test_healthy_providers_share_calls_round_robin() {
    let mut nodes = Vec::new();
    for _ in 0..3 {
        nodes.push(RpcMockBuilder::new().await);
    }
    let hits: Vec<_> = nodes
        .iter_mut()
        .map(|node| {
            let body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": explorer_core::test_utils::status_json(9)
            });
            node.get_server()
                .mock("POST", "/")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body.to_string())
                .expect(2)
                .create()
        })
        .collect();
    let urls: Vec<String> = nodes.iter().map(RpcMockBuilder::url).collect();
    let urls: Vec<&str> = urls.iter().map(String::as_str).collect();

    let (explorer, _) = http_explorer(&urls, fast_settings());
    for _ in 0..6 {
        assert_eq!(explorer.get_status().await.unwrap().latest_block_height, 9);
    }
    for hit in hits {
        hit.assert();
    }
}

#[tokio::test]
async fn test_probe_records_latency() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_status(1);

    let (explorer, providers) =
        http_explorer(&[node.url().as_str(), UNREACHABLE_URL], fast_settings());

    let healthy = explorer.test_provider(&providers[0].id).await;
    assert!(healthy.is_healthy);
    assert!(healthy.response_time.is_some());
    assert!(healthy.error.is_none());

    let down = explorer.test_provider(&providers[1].id).await;
    assert!(!down.is_healthy);
    assert!(down.error.is_some());
}
