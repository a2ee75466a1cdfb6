//! `client:routes`, `participant:message` (including the `/data` diagnostic
//! command), and `participant:heartbeat`.

use std::time::Duration;

use relay_protocol::{ChatMessage, ClientJoin, HostInit, HeartbeatInput, RoutesInput, WsMessage};
use relay_server::{state::AppState, RelayConfig};
use relay_test_utils::MockWsClient;
use serde_json::json;

async fn start_server() -> std::net::SocketAddr {
    let state = AppState::new(RelayConfig::default());
    let router = relay_server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn join_host_and_client(addr: std::net::SocketAddr) -> (MockWsClient, MockWsClient) {
    let mut host = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    host.send(&WsMessage::HostInit(HostInit {})).await.unwrap();
    let WsMessage::SessionReady(ready) = host.recv().await.unwrap() else {
        panic!("expected session:ready");
    };

    let mut client = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    client
        .send(&WsMessage::ClientJoin(ClientJoin {
            session_id: Some(ready.session_id),
        }))
        .await
        .unwrap();
    let _ = client.recv().await.unwrap();
    let _ = host.recv().await.unwrap();
    (host, client)
}

#[tokio::test]
async fn duplicate_route_upload_relays_only_once() {
    let (mut host, mut client) = join_host_and_client(start_server().await).await;
    let routes = json!([{"id": "r1", "items": [{"id": "p1", "position": {"lat": 1.0, "lng": 2.0}}]}]);

    client
        .send(&WsMessage::ClientRoutes(RoutesInput {
            routes: routes.clone(),
        }))
        .await
        .unwrap();
    let WsMessage::SessionPeerRoutes(first) = host.recv().await.unwrap() else {
        panic!("expected session:peer-routes");
    };
    assert_eq!(first.routes.len(), 1);

    client
        .send(&WsMessage::ClientRoutes(RoutesInput { routes }))
        .await
        .unwrap();
    let result = host.recv_timeout(Duration::from_millis(300)).await;
    assert!(result.is_err(), "identical routes must not re-relay, got {result:?}");
}

#[tokio::test]
async fn routes_from_the_host_are_rejected() {
    let (mut host, _client) = join_host_and_client(start_server().await).await;
    host.send(&WsMessage::ClientRoutes(RoutesInput { routes: json!([]) }))
        .await
        .unwrap();
    let WsMessage::SessionError(err) = host.recv().await.unwrap() else {
        panic!("expected session:error");
    };
    assert_eq!(err.code, relay_protocol::error_codes::NOT_CLIENT);
}

#[tokio::test]
async fn chat_message_broadcasts_to_host_and_clients() {
    let (mut host, mut client) = join_host_and_client(start_server().await).await;
    client
        .send(&WsMessage::ParticipantMessage(ChatMessage {
            text: Some(json!("hello relay")),
        }))
        .await
        .unwrap();

    let WsMessage::SessionMessage(on_host) = host.recv().await.unwrap() else {
        panic!("expected session:message on host");
    };
    assert_eq!(on_host.text, "hello relay");
    assert_eq!(on_host.role, "client");

    let WsMessage::SessionMessage(on_client) = client.recv().await.unwrap() else {
        panic!("expected session:message echoed to sender");
    };
    assert_eq!(on_client.text, "hello relay");
}

#[tokio::test]
async fn data_diagnostic_command_replies_only_to_the_sender() {
    let (mut host, mut client) = join_host_and_client(start_server().await).await;
    client
        .send(&WsMessage::ParticipantMessage(ChatMessage {
            text: Some(json!("/data 60")),
        }))
        .await
        .unwrap();

    let WsMessage::SessionMessage(reply) = client.recv().await.unwrap() else {
        panic!("expected session:message diagnostic reply");
    };
    assert_eq!(reply.participant_id, "server");
    assert_eq!(reply.role, "system");
    assert!(reply.text.contains("Total:"));
    assert!(reply.text.contains("Last 60s:"));

    let result = host.recv_timeout(Duration::from_millis(300)).await;
    assert!(result.is_err(), "the /data reply must not broadcast, got {result:?}");
}

#[tokio::test]
async fn message_with_a_missing_text_field_is_invalid_payload_not_unknown_type() {
    let (mut host, _client) = join_host_and_client(start_server().await).await;
    host.send_raw(r#"{"type":"participant:message","payload":{}}"#)
        .await
        .unwrap();
    let WsMessage::SessionError(err) = host.recv().await.unwrap() else {
        panic!("expected session:error");
    };
    assert_eq!(err.code, relay_protocol::error_codes::INVALID_PAYLOAD);
}

#[tokio::test]
async fn heartbeat_is_echoed_to_the_sender() {
    let (mut host, _client) = join_host_and_client(start_server().await).await;
    host.send(&WsMessage::ParticipantHeartbeat(HeartbeatInput {}))
        .await
        .unwrap();
    let WsMessage::SessionHeartbeat(_) = host.recv().await.unwrap() else {
        panic!("expected session:heartbeat");
    };
}
