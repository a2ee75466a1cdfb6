//! Scenario 4 from spec §8: host detach and resume.

use std::time::Duration;

use relay_protocol::{ClientJoin, HostInit, HostResume, WsMessage};
use relay_server::{state::AppState, RelayConfig};
use relay_test_utils::MockWsClient;

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

#[tokio::test]
async fn host_disconnect_then_resume_rotates_the_token_and_notifies_clients() {
    let addr = start_server().await;

    let mut host = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    host.send(&WsMessage::HostInit(HostInit {})).await.unwrap();
    let WsMessage::SessionReady(ready) = host.recv().await.unwrap() else {
        panic!("expected session:ready");
    };
    let code = ready.session_id.clone();
    let original_token = ready.resume_token.clone().unwrap();

    let mut client = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    client
        .send(&WsMessage::ClientJoin(ClientJoin {
            session_id: Some(code.clone()),
        }))
        .await
        .unwrap();
    let _ = client.recv().await.unwrap(); // session:ready

    host.close().await.unwrap();
    drop(host);

    let WsMessage::SessionHostStatus(status) = client.recv().await.unwrap() else {
        panic!("expected session:host-status");
    };
    assert!(!status.online);
    assert_eq!(status.reason, "host-disconnected");

    // Give the close pathway a moment to run on the server task before resuming.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut resumed = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    resumed
        .send(&WsMessage::HostResume(HostResume {
            session_id: Some(code.clone()),
            resume_token: Some(original_token.clone()),
        }))
        .await
        .unwrap();
    let WsMessage::SessionReady(resume_ready) = resumed.recv().await.unwrap() else {
        panic!("expected session:ready");
    };
    let new_token = resume_ready.resume_token.unwrap();
    assert_ne!(new_token, original_token);
    assert_eq!(resume_ready.session_id, code);

    let WsMessage::SessionHostStatus(status) = client.recv().await.unwrap() else {
        panic!("expected session:host-status");
    };
    assert!(status.online);
    assert_eq!(status.reason, "host-resumed");
}

#[tokio::test]
async fn resume_with_wrong_token_is_rejected() {
    let addr = start_server().await;
    let mut host = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    host.send(&WsMessage::HostInit(HostInit {})).await.unwrap();
    let WsMessage::SessionReady(ready) = host.recv().await.unwrap() else {
        panic!("expected session:ready");
    };
    host.close().await.unwrap();
    drop(host);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut resumed = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    resumed
        .send(&WsMessage::HostResume(HostResume {
            session_id: Some(ready.session_id),
            resume_token: Some("wrong-token".to_owned()),
        }))
        .await
        .unwrap();
    let WsMessage::SessionError(err) = resumed.recv().await.unwrap() else {
        panic!("expected session:error");
    };
    assert_eq!(err.code, relay_protocol::error_codes::TOKEN_MISMATCH);
}
