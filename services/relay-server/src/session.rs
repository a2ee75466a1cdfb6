// Session Record & Peers: the data model backing one active relay session.

use std::collections::HashMap;

use relay_protocol::{LocationFix, Role, Route};
use tokio::sync::mpsc;

use crate::connection::Outbound;
use crate::ids;
use crate::time::now_ms;

/// 10-entry palette clients are assigned from, cyclically, via the
/// session's color cursor.
pub const CLIENT_COLOR_PALETTE: [&str; 10] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe",
];

pub const HOST_LABEL: &str = "HQ";
pub const HOST_COLOR: &str = "#000000";

pub type OutboxHandle = mpsc::Sender<Outbound>;

/// One participant's liveness-bearing connection state.
pub struct Peer {
    pub participant_id: String,
    pub label: String,
    pub color: String,
    pub role: Role,
    /// `None` means this peer's transport is unbound (host detach only —
    /// clients are removed from the session entirely on disconnect).
    pub outbox: Option<OutboxHandle>,
    pub last_location_at_ms: Option<i64>,
    pub last_location: Option<LocationFix>,
    /// Client-only: the most recently uploaded, sanitized route set.
    pub routes: Option<Vec<Route>>,
    pub routes_hash: Option<String>,
}

impl Peer {
    fn new_host(participant_id: String, outbox: OutboxHandle) -> Self {
        Self {
            participant_id,
            label: HOST_LABEL.to_owned(),
            color: HOST_COLOR.to_owned(),
            role: Role::Host,
            outbox: Some(outbox),
            last_location_at_ms: None,
            last_location: None,
            routes: None,
            routes_hash: None,
        }
    }

    fn new_client(participant_id: String, color: String, outbox: OutboxHandle) -> Self {
        Self {
            participant_id: participant_id.clone(),
            label: participant_id,
            color,
            role: Role::Client,
            outbox: Some(outbox),
            last_location_at_ms: None,
            last_location: None,
            routes: None,
            routes_hash: None,
        }
    }

    pub fn info(&self) -> relay_protocol::PeerInfo {
        relay_protocol::PeerInfo {
            participant_id: self.participant_id.clone(),
            role: self.role,
            label: self.label.clone(),
            color: self.color.clone(),
        }
    }
}

/// The host's most recently published, content-addressed state blob.
#[derive(Clone)]
pub struct CachedState {
    pub data: String,
    pub hash: String,
}

/// One active session: exactly one host slot plus an open set of clients.
pub struct Session {
    pub code: String,
    pub host: Peer,
    pub clients: HashMap<String, Peer>,
    pub state_version: u64,
    pub cached_state: Option<CachedState>,
    pub last_activity_ms: i64,
    pub color_cursor: usize,
    pub interval_ms: u64,
    pub host_resume_token: String,
    pub host_detached_at_ms: Option<i64>,
}

impl Session {
    /// Create a brand-new session bound to a fresh host transport.
    pub fn new(code: String, host_outbox: OutboxHandle, initial_interval_ms: u64) -> Self {
        let host_participant_id = ids::generate_participant_id(false);
        Self {
            code,
            host: Peer::new_host(host_participant_id, host_outbox),
            clients: HashMap::new(),
            state_version: 0,
            cached_state: None,
            last_activity_ms: now_ms(),
            color_cursor: 0,
            interval_ms: initial_interval_ms,
            host_resume_token: ids::generate_resume_token(),
            host_detached_at_ms: None,
        }
    }

    pub fn touch_activity(&mut self) {
        self.last_activity_ms = now_ms();
    }

    /// Detach the host's transport without discarding its identity. Leaves
    /// the session eligible for `host:resume` within the grace period.
    pub fn detach_host(&mut self) {
        self.host.outbox = None;
        self.host_detached_at_ms = Some(now_ms());
        self.touch_activity();
    }

    /// Rebind a new transport to the host slot and rotate the resume token.
    pub fn resume_host(&mut self, outbox: OutboxHandle) -> String {
        self.host.outbox = Some(outbox);
        self.host_detached_at_ms = None;
        self.host_resume_token = ids::generate_resume_token();
        self.touch_activity();
        self.host_resume_token.clone()
    }

    /// Allocate and insert a new client peer, returning its participant id.
    pub fn add_client(&mut self, outbox: OutboxHandle) -> String {
        let participant_id = ids::generate_participant_id(true);
        let color = CLIENT_COLOR_PALETTE[self.color_cursor % CLIENT_COLOR_PALETTE.len()];
        self.color_cursor = self.color_cursor.wrapping_add(1);
        self.clients.insert(
            participant_id.clone(),
            Peer::new_client(participant_id.clone(), color.to_owned(), outbox),
        );
        self.touch_activity();
        participant_id
    }

    pub fn remove_client(&mut self, participant_id: &str) -> Option<Peer> {
        let removed = self.clients.remove(participant_id);
        if removed.is_some() {
            self.touch_activity();
        }
        removed
    }

    /// Replace the cached host-state blob and bump the version. Caller is
    /// responsible for the dedup check against the previous hash.
    pub fn publish_state(&mut self, data: String, hash: String) -> u64 {
        self.state_version += 1;
        self.cached_state = Some(CachedState { data, hash });
        self.touch_activity();
        self.state_version
    }

    /// Clamp and (if changed) apply a new cadence. Returns `Some(new_value)`
    /// only when the clamped value differs from the current one.
    pub fn set_interval_ms(&mut self, requested: u64) -> Option<u64> {
        let clamped = requested.clamp(
            crate::config::MIN_INTERVAL_MS,
            crate::config::MAX_INTERVAL_MS,
        );
        if clamped == self.interval_ms {
            return None;
        }
        self.interval_ms = clamped;
        self.touch_activity();
        Some(clamped)
    }

    pub fn is_host_peer(&self, participant_id: &str) -> bool {
        self.host.participant_id == participant_id
    }

    pub fn peer(&self, participant_id: &str) -> Option<&Peer> {
        if self.is_host_peer(participant_id) {
            Some(&self.host)
        } else {
            self.clients.get(participant_id)
        }
    }

    pub fn peer_mut(&mut self, participant_id: &str) -> Option<&mut Peer> {
        if self.host.participant_id == participant_id {
            Some(&mut self.host)
        } else {
            self.clients.get_mut(participant_id)
        }
    }

    /// All currently-bound peers (host, if attached, plus every client).
    pub fn bound_peers(&self) -> impl Iterator<Item = &Peer> {
        self.host
            .outbox
            .is_some()
            .then_some(&self.host)
            .into_iter()
            .chain(self.clients.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> OutboxHandle {
        mpsc::channel(8).0
    }

    #[test]
    fn new_session_has_no_detach_timestamp_and_a_bound_host() {
        let session = Session::new("ABC234".to_owned(), outbox(), 10_000);
        assert!(session.host_detached_at_ms.is_none());
        assert!(session.host.outbox.is_some());
        assert_eq!(session.interval_ms, 10_000);
    }

    #[test]
    fn detach_then_resume_round_trips_and_rotates_token() {
        let mut session = Session::new("ABC234".to_owned(), outbox(), 10_000);
        let original_token = session.host_resume_token.clone();
        session.detach_host();
        assert!(session.host_detached_at_ms.is_some());
        assert!(session.host.outbox.is_none());

        let new_token = session.resume_host(outbox());
        assert!(session.host_detached_at_ms.is_none());
        assert!(session.host.outbox.is_some());
        assert_ne!(new_token, original_token);
        assert_eq!(session.host_resume_token, new_token);
    }

    #[test]
    fn clients_cycle_through_the_ten_color_palette() {
        let mut session = Session::new("ABC234".to_owned(), outbox(), 10_000);
        let mut colors = Vec::new();
        for _ in 0..11 {
            let id = session.add_client(outbox());
            colors.push(session.clients[&id].color.clone());
        }
        assert_eq!(colors[0], colors[10]);
    }

    #[test]
    fn interval_clamps_and_reports_none_when_unchanged() {
        let mut session = Session::new("ABC234".to_owned(), outbox(), 10_000);
        assert_eq!(session.set_interval_ms(4_000), Some(5_000));
        assert_eq!(session.set_interval_ms(5_000), None);
        assert_eq!(session.set_interval_ms(125_000), Some(120_000));
    }

    #[test]
    fn publish_state_increments_version_monotonically() {
        let mut session = Session::new("ABC234".to_owned(), outbox(), 10_000);
        assert_eq!(session.publish_state("a".into(), "hash-a".into()), 1);
        assert_eq!(session.publish_state("b".into(), "hash-b".into()), 2);
    }
}
