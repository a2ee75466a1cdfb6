//! Scenarios 3 and 5 from spec §8: state-snapshot dedup and cadence changes.

use std::time::Duration;

use relay_protocol::{HostInit, HostInterval, HostState, WsMessage};
use relay_server::{state::AppState, RelayConfig};
use relay_test_utils::MockWsClient;
use serde_json::json;

async fn start_server(config: RelayConfig) -> std::net::SocketAddr {
    let state = AppState::new(config);
    let router = relay_server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect_host(addr: std::net::SocketAddr) -> MockWsClient {
    let mut host = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    host.send(&WsMessage::HostInit(HostInit {})).await.unwrap();
    let _ = host.recv().await.unwrap();
    host
}

#[tokio::test]
async fn identical_state_blob_does_not_bump_version_twice() {
    let addr = start_server(RelayConfig::default()).await;
    let mut host = connect_host(addr).await;

    host.send(&WsMessage::HostState(HostState {
        data: Some(json!("blob-one")),
    }))
    .await
    .unwrap();
    let WsMessage::SessionState(first) = host.recv().await.unwrap() else {
        panic!("expected session:state");
    };
    assert_eq!(first.version, 1);

    host.send(&WsMessage::HostState(HostState {
        data: Some(json!("blob-one")),
    }))
    .await
    .unwrap();
    let result = host.recv_timeout(Duration::from_millis(300)).await;
    assert!(result.is_err(), "duplicate state must not re-emit session:state, got {result:?}");

    host.send(&WsMessage::HostState(HostState {
        data: Some(json!("blob-two")),
    }))
    .await
    .unwrap();
    let WsMessage::SessionState(second) = host.recv().await.unwrap() else {
        panic!("expected session:state");
    };
    assert_eq!(second.version, 2);
}

#[tokio::test]
async fn interval_coercion_matches_spec_boundaries() {
    let addr = start_server(RelayConfig::default()).await;
    let mut host = connect_host(addr).await;

    host.send(&WsMessage::HostInterval(HostInterval {
        interval_ms: Some(json!(4_000)),
        seconds: None,
    }))
    .await
    .unwrap();
    let WsMessage::SessionInterval(i) = host.recv().await.unwrap() else {
        panic!("expected session:interval");
    };
    assert_eq!(i.interval_ms, 5_000);

    host.send(&WsMessage::HostInterval(HostInterval {
        interval_ms: Some(json!(125_000)),
        seconds: None,
    }))
    .await
    .unwrap();
    let WsMessage::SessionInterval(i) = host.recv().await.unwrap() else {
        panic!("expected session:interval");
    };
    assert_eq!(i.interval_ms, 120_000);

    host.send(&WsMessage::HostInterval(HostInterval {
        interval_ms: None,
        seconds: Some(json!(7)),
    }))
    .await
    .unwrap();
    let WsMessage::SessionInterval(i) = host.recv().await.unwrap() else {
        panic!("expected session:interval");
    };
    assert_eq!(i.interval_ms, 7_000);
}

#[tokio::test]
async fn non_finite_interval_is_rejected() {
    let addr = start_server(RelayConfig::default()).await;
    let mut host = connect_host(addr).await;

    host.send_raw(r#"{"type":"host:interval","payload":{"intervalMs":"not-a-number"}}"#)
        .await
        .unwrap();
    let WsMessage::SessionError(err) = host.recv().await.unwrap() else {
        panic!("expected session:error");
    };
    assert_eq!(err.code, relay_protocol::error_codes::INVALID_PAYLOAD);
}

#[tokio::test]
async fn state_with_a_missing_data_field_is_invalid_payload_not_unknown_type() {
    let addr = start_server(RelayConfig::default()).await;
    let mut host = connect_host(addr).await;

    host.send_raw(r#"{"type":"host:state","payload":{}}"#)
        .await
        .unwrap();
    let WsMessage::SessionError(err) = host.recv().await.unwrap() else {
        panic!("expected session:error");
    };
    assert_eq!(err.code, relay_protocol::error_codes::INVALID_PAYLOAD);
}
