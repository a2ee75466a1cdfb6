// Protocol-level errors surfaced to the offending transport as a single
// `session:error` frame. Never causes the connection to be dropped.

use relay_protocol::{error_codes, SessionError, WsMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub code: &'static str,
    pub message: String,
}

impl DispatchError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_joined() -> Self {
        Self::new(error_codes::NOT_JOINED, "transport is not bound to a session")
    }

    pub fn already_bound() -> Self {
        Self::new(
            error_codes::ALREADY_BOUND,
            "transport is already bound to a session",
        )
    }

    pub fn session_not_found() -> Self {
        Self::new(error_codes::SESSION_NOT_FOUND, "session not found")
    }

    pub fn not_host() -> Self {
        Self::new(error_codes::NOT_HOST, "only the host may send this message")
    }

    pub fn not_client() -> Self {
        Self::new(
            error_codes::NOT_CLIENT,
            "only a client may send this message",
        )
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PAYLOAD, message)
    }

    pub fn invalid_json() -> Self {
        Self::new(error_codes::INVALID_JSON, "invalid JSON payload")
    }

    pub fn unknown_type(kind: &str) -> Self {
        Self::new(
            error_codes::UNKNOWN_TYPE,
            format!("Unknown message type: {kind}"),
        )
    }

    pub fn into_frame(self) -> WsMessage {
        WsMessage::SessionError(SessionError {
            code: self.code.to_owned(),
            message: self.message,
        })
    }
}
