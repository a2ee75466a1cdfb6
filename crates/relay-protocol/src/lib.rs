// relay-protocol: wire types for the session relay service.
//
// Every frame on the wire is a JSON object `{"type": "<string>", "payload": {...}}`.
// `WsMessage` models that shape directly via serde's adjacently-tagged enum
// representation, so encoding/decoding a frame is exactly
// `serde_json::to_string(&msg)` / `serde_json::from_str::<WsMessage>(text)`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// Role a peer holds within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

/// Public description of a peer, as handed to joiners and broadcast on join/leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub participant_id: String,
    pub role: Role,
    pub label: String,
    pub color: String,
}

/// A location fix as received from (or relayed to) a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub timestamp: i64,
}

/// A single point within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePosition {
    pub lat: f64,
    pub lng: f64,
}

/// One entry in a route's point list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub position: RoutePosition,
}

/// A named, colored sequence of route items uploaded by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub items: Vec<RouteItem>,
}

// ---------------------------------------------------------------------------
// Inbound payloads (host/client -> server)
// ---------------------------------------------------------------------------

/// Payload for `host:init`. Carries nothing; the server mints everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInit {}

/// Payload for `host:resume`. Fields are accepted loosely (missing fields
/// decode as `None` rather than failing the frame) so a malformed payload
/// surfaces as the dispatcher's own `INVALID_PAYLOAD`/`TOKEN_MISMATCH`
/// error, never as a false `UNKNOWN_TYPE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostResume {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub resume_token: Option<String>,
}

/// Payload for `client:join`. `session_id` is optional on the wire so a
/// missing field is a dispatcher-level `INVALID_PAYLOAD`, not a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientJoin {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payload for `participant:location`. Fields are accepted loosely and
/// sanitized server-side; this type mirrors the wire shape before sanitization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub lat: Option<serde_json::Value>,
    #[serde(default)]
    pub lng: Option<serde_json::Value>,
    #[serde(default)]
    pub accuracy: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Payload for `host:state`. `data` is an opaque compressed blob (the relay
/// only hashes and forwards it — see `relay_server::sanitize`); accepted
/// loosely so a missing/non-string `data` is a dispatcher `INVALID_PAYLOAD`
/// rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Payload for `host:interval`. Exactly one of the two fields is expected;
/// `seconds` takes effect as `seconds * 1000` when `interval_ms` is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInterval {
    #[serde(default)]
    pub interval_ms: Option<serde_json::Value>,
    #[serde(default)]
    pub seconds: Option<serde_json::Value>,
}

/// Payload for `client:routes`. Rejected entirely if not a JSON array; a
/// missing `routes` field decodes as `Value::Null`, which sanitization
/// rejects the same way as any other non-array value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutesInput {
    #[serde(default)]
    pub routes: serde_json::Value,
}

/// Payload for `participant:message`. `text` is accepted loosely so a
/// missing/non-string value is a dispatcher `INVALID_PAYLOAD`, not a decode
/// failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub text: Option<serde_json::Value>,
}

/// Payload for `participant:heartbeat`. Carries nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatInput {}

/// Payload for `host:shutdown`. Carries nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostShutdown {}

// ---------------------------------------------------------------------------
// Outbound payloads (server -> peer)
// ---------------------------------------------------------------------------

/// `session:ready` — sent once to the peer that just (re)bound a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReady {
    pub session_id: String,
    pub role: Role,
    pub participant_id: String,
    pub peers: Vec<PeerInfo>,
    pub state: Option<StateSnapshot>,
    pub interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
}

/// The cached host-state blob, as handed to a resuming host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub version: u64,
    pub data: String,
    pub hash: String,
}

/// `session:peer-joined` — sent to the host only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPeerJoined {
    pub peer: PeerInfo,
}

/// `session:peer-left` — sent to the host only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPeerLeft {
    pub participant_id: String,
}

/// `session:location` — sent to the host only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLocation {
    pub participant_id: String,
    #[serde(flatten)]
    pub fix: LocationFix,
}

/// `session:peer-routes` — sent to the host only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPeerRoutes {
    pub participant_id: String,
    pub routes: Vec<Route>,
}

/// `session:state` — sent to the host only (see DESIGN.md open question).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub version: u64,
    pub data: String,
    pub compressed: bool,
    pub hash: String,
    pub size: usize,
}

/// `session:interval` — broadcast to host and all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInterval {
    pub interval_ms: u64,
}

/// `session:host-status` — broadcast to all clients on host detach/resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHostStatus {
    pub online: bool,
    pub reason: String,
    pub timestamp: i64,
}

/// `session:heartbeat` — echoed to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeartbeat {
    pub timestamp: i64,
}

/// `session:message` — chat broadcast, or a `/data` diagnostic reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub participant_id: String,
    pub text: String,
    pub role: String,
    pub timestamp: i64,
}

/// `session:ended` — broadcast to everyone just before the transports close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    pub reason: String,
}

/// `session:error` — sent only to the peer whose frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub code: String,
    pub message: String,
}

/// Frozen error codes attached to `session:error` frames.
pub mod error_codes {
    pub const ALREADY_BOUND: &str = "ALREADY_BOUND";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const TOKEN_MISMATCH: &str = "TOKEN_MISMATCH";
    pub const HOST_ALREADY_CONNECTED: &str = "HOST_ALREADY_CONNECTED";
    pub const NOT_JOINED: &str = "NOT_JOINED";
    pub const NOT_HOST: &str = "NOT_HOST";
    pub const NOT_CLIENT: &str = "NOT_CLIENT";
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";
    pub const INVALID_JSON: &str = "INVALID_JSON";
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// All WebSocket frame kinds, tagged by `type` with payload nested under
/// `payload` — matching `{"type": "...", "payload": {...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    #[serde(rename = "host:init")]
    HostInit(HostInit),
    #[serde(rename = "host:resume")]
    HostResume(HostResume),
    #[serde(rename = "client:join")]
    ClientJoin(ClientJoin),
    #[serde(rename = "participant:location")]
    ParticipantLocation(LocationInput),
    #[serde(rename = "host:state")]
    HostState(HostState),
    #[serde(rename = "host:interval")]
    HostInterval(HostInterval),
    #[serde(rename = "client:routes")]
    ClientRoutes(RoutesInput),
    #[serde(rename = "participant:message")]
    ParticipantMessage(ChatMessage),
    #[serde(rename = "participant:heartbeat")]
    ParticipantHeartbeat(HeartbeatInput),
    #[serde(rename = "host:shutdown")]
    HostShutdown(HostShutdown),

    #[serde(rename = "session:ready")]
    SessionReady(SessionReady),
    #[serde(rename = "session:peer-joined")]
    SessionPeerJoined(SessionPeerJoined),
    #[serde(rename = "session:peer-left")]
    SessionPeerLeft(SessionPeerLeft),
    #[serde(rename = "session:location")]
    SessionLocation(SessionLocation),
    #[serde(rename = "session:peer-routes")]
    SessionPeerRoutes(SessionPeerRoutes),
    #[serde(rename = "session:state")]
    SessionState(SessionState),
    #[serde(rename = "session:interval")]
    SessionInterval(SessionInterval),
    #[serde(rename = "session:host-status")]
    SessionHostStatus(SessionHostStatus),
    #[serde(rename = "session:heartbeat")]
    SessionHeartbeat(SessionHeartbeat),
    #[serde(rename = "session:message")]
    SessionMessage(SessionMessage),
    #[serde(rename = "session:ended")]
    SessionEnded(SessionEnded),
    #[serde(rename = "session:error")]
    SessionError(SessionError),
}

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// Why a raw text frame could not be turned into a `WsMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// The frame was not a JSON object with a string `type` field.
    InvalidJson,
    /// `type` was present and well-formed, but not one of the known kinds,
    /// or its `payload` didn't match the shape that kind expects.
    UnknownType(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Decode one inbound text frame.
///
/// Unlike deriving straight through `WsMessage`'s `Deserialize` impl, this
/// preserves the original `type` string on failure so callers can echo
/// `Unknown message type: <type>` per the dispatcher contract.
pub fn decode_frame(text: &str) -> Result<WsMessage, FrameDecodeError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|_| FrameDecodeError::InvalidJson)?;
    macro_rules! parse {
        ($variant:ident) => {
            serde_json::from_value(raw.payload)
                .map(WsMessage::$variant)
                .map_err(|_| FrameDecodeError::UnknownType(raw.kind.clone()))
        };
    }
    match raw.kind.as_str() {
        "host:init" => parse!(HostInit),
        "host:resume" => parse!(HostResume),
        "client:join" => parse!(ClientJoin),
        "participant:location" => parse!(ParticipantLocation),
        "host:state" => parse!(HostState),
        "host:interval" => parse!(HostInterval),
        "client:routes" => parse!(ClientRoutes),
        "participant:message" => parse!(ParticipantMessage),
        "participant:heartbeat" => parse!(ParticipantHeartbeat),
        "host:shutdown" => parse!(HostShutdown),
        other => Err(FrameDecodeError::UnknownType(other.to_owned())),
    }
}
