// Connection Lifecycle: the axum WebSocket handler, its per-socket outbox,
// and the global registry the supervisor uses to probe liveness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use relay_protocol::{decode_frame, FrameDecodeError, Role};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::dispatch;
use crate::error::DispatchError;
use crate::lifecycle;
use crate::state::AppState;
use crate::traffic::Direction;

const OUTBOX_CAPACITY: usize = 64;

/// What the connection task should do with the socket next. Covers both
/// application replies and liveness/termination control flow, so a single
/// best-effort channel drives everything a peer ever receives.
pub enum Outbound {
    Text(String),
    Ping,
    Close { code: u16, reason: String },
}

/// The one active binding a transport may hold: which session, which
/// participant slot, and in which role. `None` until the transport sends
/// `host:init` / `host:resume` / `client:join`.
#[derive(Clone)]
pub struct Binding {
    pub session_code: String,
    pub participant_id: String,
    pub role: Role,
}

struct ConnEntry {
    outbox: mpsc::Sender<Outbound>,
    alive: Arc<AtomicBool>,
}

/// Tracks every currently-open transport for the liveness probe, independent
/// of whether it has bound to a session yet.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    conns: Arc<RwLock<HashMap<u64, ConnEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, outbox: mpsc::Sender<Outbound>, alive: Arc<AtomicBool>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.conns.write().await.insert(id, ConnEntry { outbox, alive });
        id
    }

    async fn unregister(&self, id: u64) {
        self.conns.write().await.remove(&id);
    }

    /// One liveness sweep: ping anything that answered last round, and
    /// force-terminate anything that didn't.
    pub async fn tick(&self) {
        let mut to_kill = Vec::new();
        {
            let conns = self.conns.read().await;
            for entry in conns.values() {
                if entry.alive.swap(false, Ordering::Relaxed) {
                    let _ = entry.outbox.try_send(Outbound::Ping);
                } else {
                    to_kill.push(entry.outbox.clone());
                }
            }
        }
        for outbox in to_kill {
            let _ = outbox.try_send(Outbound::Close {
                code: 1001,
                reason: "liveness timeout".to_owned(),
            });
        }
    }

    pub async fn len(&self) -> usize {
        self.conns.read().await.len()
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Outbound>(OUTBOX_CAPACITY);
    let alive = Arc::new(AtomicBool::new(true));
    let conn_id = state
        .connections
        .register(outbox_tx.clone(), Arc::clone(&alive))
        .await;

    let mut binding: Option<Binding> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.traffic.record(Direction::In, text.len());
                        handle_inbound_text(&state, &mut binding, &outbox_tx, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        alive.store(true, Ordering::Relaxed);
                    }
                    Some(Ok(Message::Ping(_))) => {
                        alive.store(true, Ordering::Relaxed);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        break;
                    }
                }
            }
            outgoing = outbox_rx.recv() => {
                match outgoing {
                    Some(Outbound::Text(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Ping) => {
                        if socket.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.connections.unregister(conn_id).await;
    if let Some(binding) = binding {
        lifecycle::drop_participant(&state, &binding).await;
    }
}

async fn handle_inbound_text(
    state: &AppState,
    binding: &mut Option<Binding>,
    my_outbox: &mpsc::Sender<Outbound>,
    text: &str,
) {
    let msg = match decode_frame(text) {
        Ok(msg) => msg,
        Err(FrameDecodeError::InvalidJson) => {
            send_error(state, my_outbox, DispatchError::invalid_json()).await;
            return;
        }
        Err(FrameDecodeError::UnknownType(kind)) => {
            send_error(state, my_outbox, DispatchError::unknown_type(&kind)).await;
            return;
        }
    };

    if let Err(err) = dispatch::handle(state, binding, my_outbox, msg).await {
        info!(code = err.code, "rejected inbound frame");
        send_error(state, my_outbox, err).await;
    }
}

async fn send_error(state: &AppState, my_outbox: &mpsc::Sender<Outbound>, err: DispatchError) {
    if let Ok(json) = serde_json::to_string(&err.into_frame()) {
        state.traffic.record(Direction::Out, json.len());
        let _ = my_outbox.try_send(Outbound::Text(json));
    }
}
