// Protocol Dispatcher: one handler per inbound command, each responsible
// for its own preconditions, state mutation, and broadcast.

use relay_protocol::{
    error_codes, ChatMessage, ClientJoin, HostInterval, HostResume, HostState, LocationInput,
    PeerInfo, Role, RoutesInput, SessionHeartbeat, SessionHostStatus, SessionInterval,
    SessionLocation, SessionMessage, SessionPeerJoined, SessionPeerRoutes, SessionReady,
    SessionState, StateSnapshot, WsMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broadcast;
use crate::connection::{Binding, Outbound};
use crate::error::DispatchError;
use crate::lifecycle;
use crate::sanitize::{self, RoutesSanitizeResult};
use crate::state::AppState;
use crate::time::now_ms;
use crate::traffic::Direction;

type OutboxHandle = mpsc::Sender<Outbound>;

/// Dispatch one already-decoded frame. `binding` is mutated in place on
/// `host:init` / `host:resume` / `client:join`.
pub async fn handle(
    state: &AppState,
    binding: &mut Option<Binding>,
    my_outbox: &OutboxHandle,
    msg: WsMessage,
) -> Result<(), DispatchError> {
    match msg {
        WsMessage::HostInit(_) => handle_host_init(state, binding, my_outbox).await,
        WsMessage::HostResume(payload) => {
            handle_host_resume(state, binding, my_outbox, payload).await
        }
        WsMessage::ClientJoin(payload) => handle_client_join(state, binding, my_outbox, payload).await,
        WsMessage::ParticipantLocation(payload) => {
            handle_location(state, binding, payload).await
        }
        WsMessage::HostState(payload) => handle_host_state(state, binding, payload).await,
        WsMessage::HostInterval(payload) => handle_host_interval(state, binding, payload).await,
        WsMessage::ClientRoutes(payload) => handle_client_routes(state, binding, payload).await,
        WsMessage::ParticipantMessage(payload) => {
            handle_message(state, binding, my_outbox, payload).await
        }
        WsMessage::ParticipantHeartbeat(_) => handle_heartbeat(state, binding, my_outbox).await,
        WsMessage::HostShutdown(_) => handle_host_shutdown(state, binding).await,
        // decode_frame only ever produces inbound variants.
        _ => Ok(()),
    }
}

async fn handle_host_init(
    state: &AppState,
    binding: &mut Option<Binding>,
    my_outbox: &OutboxHandle,
) -> Result<(), DispatchError> {
    if binding.is_some() {
        return Err(DispatchError::already_bound());
    }
    let (code, handle) = state
        .registry
        .create(
            state.config.session_code_length,
            my_outbox.clone(),
            state.config.location_interval_ms,
        )
        .await;
    let mut session = handle.lock().await;
    let participant_id = session.host.participant_id.clone();
    let ready = WsMessage::SessionReady(SessionReady {
        session_id: code.clone(),
        role: Role::Host,
        participant_id: participant_id.clone(),
        peers: vec![],
        state: None,
        interval_ms: session.interval_ms,
        resume_token: Some(session.host_resume_token.clone()),
    });
    broadcast::send_peer(&session.host, &ready, &state.traffic);
    drop(session);

    info!(session_code = %code, %participant_id, "session created");
    *binding = Some(Binding {
        session_code: code,
        participant_id,
        role: Role::Host,
    });
    Ok(())
}

async fn handle_host_resume(
    state: &AppState,
    binding: &mut Option<Binding>,
    my_outbox: &OutboxHandle,
    payload: HostResume,
) -> Result<(), DispatchError> {
    if binding.is_some() {
        return Err(DispatchError::already_bound());
    }
    let code = payload.session_id.as_deref().unwrap_or("").trim().to_uppercase();
    let handle = state
        .registry
        .get(&code)
        .await
        .ok_or_else(DispatchError::session_not_found)?;
    let mut session = handle.lock().await;

    if session.host.outbox.is_some() {
        return Err(DispatchError::new(
            error_codes::HOST_ALREADY_CONNECTED,
            "host is already connected",
        ));
    }
    let resume_token = payload.resume_token.as_deref().unwrap_or("");
    if session.host_resume_token != resume_token {
        return Err(DispatchError::new(
            error_codes::TOKEN_MISMATCH,
            "resume token does not match",
        ));
    }

    let new_token = session.resume_host(my_outbox.clone());
    let peers: Vec<PeerInfo> = session.clients.values().map(|peer| peer.info()).collect();
    let cached_state = session.cached_state.clone().map(|cs| StateSnapshot {
        version: session.state_version,
        data: cs.data,
        hash: cs.hash,
    });
    let participant_id = session.host.participant_id.clone();
    let ready = WsMessage::SessionReady(SessionReady {
        session_id: code.clone(),
        role: Role::Host,
        participant_id: participant_id.clone(),
        peers,
        state: cached_state,
        interval_ms: session.interval_ms,
        resume_token: Some(new_token),
    });
    broadcast::send_peer(&session.host, &ready, &state.traffic);

    let status = WsMessage::SessionHostStatus(SessionHostStatus {
        online: true,
        reason: "host-resumed".to_owned(),
        timestamp: now_ms(),
    });
    broadcast::send_clients(&session, &status, &state.traffic, None);
    drop(session);

    info!(session_code = %code, "host resumed");
    *binding = Some(Binding {
        session_code: code,
        participant_id,
        role: Role::Host,
    });
    Ok(())
}

async fn handle_client_join(
    state: &AppState,
    binding: &mut Option<Binding>,
    my_outbox: &OutboxHandle,
    payload: ClientJoin,
) -> Result<(), DispatchError> {
    if binding.is_some() {
        return Err(DispatchError::already_bound());
    }
    let code = payload.session_id.as_deref().unwrap_or("").trim().to_uppercase();
    if code.is_empty() {
        return Err(DispatchError::invalid_payload("missing session id"));
    }
    let handle = state
        .registry
        .get(&code)
        .await
        .ok_or_else(DispatchError::session_not_found)?;
    let mut session = handle.lock().await;

    let participant_id = session.add_client(my_outbox.clone());
    let ready = WsMessage::SessionReady(SessionReady {
        session_id: code.clone(),
        role: Role::Client,
        participant_id: participant_id.clone(),
        peers: vec![],
        state: None,
        interval_ms: session.interval_ms,
        resume_token: None,
    });
    let peer = session
        .clients
        .get(&participant_id)
        .expect("just inserted");
    broadcast::send_peer(peer, &ready, &state.traffic);

    let joined = WsMessage::SessionPeerJoined(SessionPeerJoined { peer: peer.info() });
    broadcast::send_host(&session, &joined, &state.traffic);
    drop(session);

    *binding = Some(Binding {
        session_code: code,
        participant_id,
        role: Role::Client,
    });
    Ok(())
}

async fn handle_location(
    state: &AppState,
    binding: &Option<Binding>,
    payload: LocationInput,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    let Some(handle) = state.registry.get(&b.session_code).await else {
        return Ok(());
    };
    let mut session = handle.lock().await;
    let interval_ms = session.interval_ms;

    let Some(peer) = session.peer_mut(&b.participant_id) else {
        return Ok(());
    };
    let now = now_ms();
    if let Some(last) = peer.last_location_at_ms {
        if now - last < interval_ms as i64 {
            debug!(participant_id = %b.participant_id, interval_ms, "location fix throttled");
            return Ok(());
        }
    }
    let Some(fix) = sanitize::sanitize_location(&payload) else {
        return Ok(());
    };
    peer.last_location_at_ms = Some(now);
    peer.last_location = Some(fix.clone());
    let is_client = matches!(peer.role, Role::Client);
    session.touch_activity();

    if is_client {
        let loc = WsMessage::SessionLocation(SessionLocation {
            participant_id: b.participant_id.clone(),
            fix,
        });
        broadcast::send_host(&session, &loc, &state.traffic);
    }
    Ok(())
}

async fn handle_host_state(
    state: &AppState,
    binding: &Option<Binding>,
    payload: HostState,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    if b.role != Role::Host {
        return Err(DispatchError::not_host());
    }
    let data = payload.data.as_ref().and_then(|v| v.as_str());
    let Some(data) = data.filter(|d| !d.is_empty()) else {
        return Err(DispatchError::invalid_payload(
            "state payload must be a non-empty string",
        ));
    };
    let data = data.to_owned();
    let Some(handle) = state.registry.get(&b.session_code).await else {
        return Ok(());
    };
    let mut session = handle.lock().await;

    let hash = sanitize::state_hash(data.as_bytes());
    if session.cached_state.as_ref().map(|cs| cs.hash.as_str()) == Some(hash.as_str()) {
        return Ok(());
    }
    let size = data.len();
    let version = session.publish_state(data.clone(), hash.clone());
    let msg = WsMessage::SessionState(SessionState {
        version,
        data,
        compressed: true,
        hash,
        size,
    });
    broadcast::send_host(&session, &msg, &state.traffic);
    Ok(())
}

async fn handle_host_interval(
    state: &AppState,
    binding: &Option<Binding>,
    payload: HostInterval,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    if b.role != Role::Host {
        return Err(DispatchError::not_host());
    }
    let requested = coerce_interval_ms(&payload)?;
    let Some(handle) = state.registry.get(&b.session_code).await else {
        return Ok(());
    };
    let mut session = handle.lock().await;
    let Some(new_value) = session.set_interval_ms(requested) else {
        return Ok(());
    };
    let msg = WsMessage::SessionInterval(SessionInterval {
        interval_ms: new_value,
    });
    broadcast::send_all(&session, &msg, &state.traffic, None);
    Ok(())
}

fn coerce_interval_ms(payload: &HostInterval) -> Result<u64, DispatchError> {
    if let Some(value) = &payload.interval_ms {
        return value
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as u64)
            .ok_or_else(|| DispatchError::invalid_payload("intervalMs must be a finite number"));
    }
    if let Some(value) = &payload.seconds {
        return value
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| (n * 1000.0) as u64)
            .ok_or_else(|| DispatchError::invalid_payload("seconds must be a finite number"));
    }
    Err(DispatchError::invalid_payload(
        "host:interval requires intervalMs or seconds",
    ))
}

async fn handle_client_routes(
    state: &AppState,
    binding: &Option<Binding>,
    payload: RoutesInput,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    if b.role != Role::Client {
        return Err(DispatchError::not_client());
    }
    let sanitized = match sanitize::sanitize_routes(
        &payload.routes,
        state.config.max_client_routes,
        state.config.max_route_points,
    ) {
        RoutesSanitizeResult::NotAList => {
            return Err(DispatchError::invalid_payload("routes must be a list"));
        }
        RoutesSanitizeResult::Ok(routes) => routes,
    };

    let Some(handle) = state.registry.get(&b.session_code).await else {
        return Ok(());
    };
    let mut session = handle.lock().await;
    let hash = sanitize::route_hash(&sanitized);

    if session
        .clients
        .get(&b.participant_id)
        .and_then(|peer| peer.routes_hash.as_deref())
        == Some(hash.as_str())
    {
        return Ok(());
    }
    let Some(peer) = session.clients.get_mut(&b.participant_id) else {
        return Ok(());
    };
    peer.routes = if sanitized.is_empty() {
        None
    } else {
        Some(sanitized.clone())
    };
    peer.routes_hash = Some(hash);
    session.touch_activity();

    let msg = WsMessage::SessionPeerRoutes(SessionPeerRoutes {
        participant_id: b.participant_id.clone(),
        routes: sanitized,
    });
    broadcast::send_host(&session, &msg, &state.traffic);
    Ok(())
}

async fn handle_message(
    state: &AppState,
    binding: &Option<Binding>,
    my_outbox: &OutboxHandle,
    payload: ChatMessage,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    let text = payload.text.as_ref().and_then(|v| v.as_str()).unwrap_or("").trim();
    if text.is_empty() {
        return Err(DispatchError::invalid_payload(
            "message text must not be empty",
        ));
    }
    let Some(handle) = state.registry.get(&b.session_code).await else {
        return Ok(());
    };
    let session = handle.lock().await;

    if let Some(rest) = text.strip_prefix("/data") {
        let window_s = rest.trim().split_whitespace().next().and_then(|s| s.parse::<u64>().ok());
        let summary = state.traffic.summarize(window_s);
        let reply = WsMessage::SessionMessage(SessionMessage {
            participant_id: "server".to_owned(),
            text: format_traffic_reply(&summary, window_s),
            role: "system".to_owned(),
            timestamp: now_ms(),
        });
        if let Ok(json) = serde_json::to_string(&reply) {
            state.traffic.record(Direction::Out, json.len());
            let _ = my_outbox.try_send(Outbound::Text(json));
        }
        return Ok(());
    }

    let role = match b.role {
        Role::Host => "host",
        Role::Client => "client",
    };
    let msg = WsMessage::SessionMessage(SessionMessage {
        participant_id: b.participant_id.clone(),
        text: text.to_owned(),
        role: role.to_owned(),
        timestamp: now_ms(),
    });
    broadcast::send_all(&session, &msg, &state.traffic, None);
    Ok(())
}

fn format_traffic_reply(summary: &crate::traffic::TrafficSummary, window_s: Option<u64>) -> String {
    let total_kb = (summary.total_in + summary.total_out) as f64 / 1024.0;
    let mut text = format!("Total: {total_kb:.1} KB");
    if let (Some(w), Some(wi), Some(wo)) = (window_s, summary.window_in, summary.window_out) {
        let window_kb = (wi + wo) as f64 / 1024.0;
        let rate = if w > 0 { window_kb / w as f64 } else { 0.0 };
        text.push_str(&format!("\nLast {w}s: {window_kb:.1} KB ({rate:.1} KB/s)"));
    }
    text
}

async fn handle_heartbeat(
    state: &AppState,
    binding: &Option<Binding>,
    my_outbox: &OutboxHandle,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    if let Some(handle) = state.registry.get(&b.session_code).await {
        handle.lock().await.touch_activity();
    }
    let reply = WsMessage::SessionHeartbeat(SessionHeartbeat { timestamp: now_ms() });
    if let Ok(json) = serde_json::to_string(&reply) {
        state.traffic.record(Direction::Out, json.len());
        let _ = my_outbox.try_send(Outbound::Text(json));
    }
    Ok(())
}

async fn handle_host_shutdown(
    state: &AppState,
    binding: &Option<Binding>,
) -> Result<(), DispatchError> {
    let b = binding.as_ref().ok_or_else(DispatchError::not_joined)?;
    if b.role != Role::Host {
        return Err(DispatchError::not_host());
    }
    lifecycle::terminate_session(state, &b.session_code, "host-ended").await;
    Ok(())
}
