// Broadcast primitives: the three directed-send shapes every dispatcher
// handler is built from. All sends are best-effort — a full or closed
// outbox silently drops the frame rather than blocking or queueing.

use relay_protocol::WsMessage;

use crate::connection::Outbound;
use crate::session::{OutboxHandle, Peer, Session};
use crate::traffic::{Direction, TrafficMeter};

fn send_frame(outbox: Option<&OutboxHandle>, msg: &WsMessage, meter: &TrafficMeter) {
    let Some(outbox) = outbox else { return };
    let Ok(json) = serde_json::to_string(msg) else {
        return;
    };
    meter.record(Direction::Out, json.len());
    let _ = outbox.try_send(Outbound::Text(json));
}

pub fn send_peer(peer: &Peer, msg: &WsMessage, meter: &TrafficMeter) {
    send_frame(peer.outbox.as_ref(), msg, meter);
}

pub fn send_host(session: &Session, msg: &WsMessage, meter: &TrafficMeter) {
    send_frame(session.host.outbox.as_ref(), msg, meter);
}

/// Send to every client, optionally skipping one participant id (e.g. the
/// uploader of the thing being echoed back).
pub fn send_clients(session: &Session, msg: &WsMessage, meter: &TrafficMeter, exclude: Option<&str>) {
    for (id, peer) in &session.clients {
        if Some(id.as_str()) == exclude {
            continue;
        }
        send_frame(peer.outbox.as_ref(), msg, meter);
    }
}

/// Send to the host and every client, optionally skipping one participant id.
pub fn send_all(session: &Session, msg: &WsMessage, meter: &TrafficMeter, exclude: Option<&str>) {
    if Some(session.host.participant_id.as_str()) != exclude {
        send_host(session, msg, meter);
    }
    send_clients(session, msg, meter, exclude);
}
