// Session Lifecycle: what happens to a session's peers when one transport
// drops, and how a whole session is torn down (host:shutdown, idle expiry,
// or server shutdown).

use relay_protocol::{SessionEnded, SessionHostStatus, SessionPeerLeft, WsMessage};
use tracing::{debug, info};

use crate::broadcast;
use crate::connection::{Binding, Outbound};
use crate::state::AppState;
use crate::time::now_ms;

/// A transport closed. Detach the host slot (eligible for `host:resume`) or
/// drop the client entirely, and tell the remaining peers.
pub async fn drop_participant(state: &AppState, binding: &Binding) {
    let Some(handle) = state.registry.get(&binding.session_code).await else {
        return;
    };
    let mut session = handle.lock().await;

    if session.is_host_peer(&binding.participant_id) {
        session.detach_host();
        debug!(session_code = %binding.session_code, "host detached");
        let status = WsMessage::SessionHostStatus(SessionHostStatus {
            online: false,
            reason: "host-disconnected".to_owned(),
            timestamp: now_ms(),
        });
        broadcast::send_clients(&session, &status, &state.traffic, None);
    } else if session.remove_client(&binding.participant_id).is_some() {
        let left = WsMessage::SessionPeerLeft(SessionPeerLeft {
            participant_id: binding.participant_id.clone(),
        });
        broadcast::send_host(&session, &left, &state.traffic);
    }
}

/// Tear down a whole session: broadcast `session:ended`, close every bound
/// transport, and remove the session from the registry.
pub async fn terminate_session(state: &AppState, code: &str, reason: &str) {
    let Some(handle) = state.registry.delete(code).await else {
        return;
    };
    let session = handle.lock().await;

    let ended = WsMessage::SessionEnded(SessionEnded {
        reason: reason.to_owned(),
    });
    let Ok(json) = serde_json::to_string(&ended) else {
        return;
    };

    for peer in session.bound_peers() {
        if let Some(outbox) = &peer.outbox {
            let close_code = if session.is_host_peer(&peer.participant_id) {
                1001
            } else {
                1012
            };
            let _ = outbox.try_send(Outbound::Text(json.clone()));
            let _ = outbox.try_send(Outbound::Close {
                code: close_code,
                reason: reason.to_owned(),
            });
        }
    }
    info!(session_code = code, reason, "session terminated");
}
