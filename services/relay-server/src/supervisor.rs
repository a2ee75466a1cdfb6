// Supervisor Loops: the two background tasks that keep a live process
// honest — a liveness probe over every open transport, and an expiry sweep
// over idle/abandoned sessions.

use std::time::Duration;

use tracing::info;

use crate::lifecycle;
use crate::state::AppState;
use crate::time::now_ms;

const LIVENESS_INTERVAL: Duration = Duration::from_secs(30);
const MIN_EXPIRY_INTERVAL_S: u64 = 60;

/// Ping every open transport every 30s; anything that didn't answer the
/// previous round gets force-closed.
pub async fn run_liveness_probe(state: AppState) {
    let mut ticker = tokio::time::interval(LIVENESS_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        state.connections.tick().await;
    }
}

/// Periodically sweep sessions that have been idle past `session_ttl_ms`, or
/// whose host has been detached past `host_resume_grace_ms`. Runs at half
/// the TTL, floored so a short TTL in tests doesn't spin the sweep.
pub async fn run_expiry_sweep(state: AppState) {
    let interval_s = (state.config.session_ttl_ms / 2 / 1000).max(MIN_EXPIRY_INTERVAL_S);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

pub(crate) async fn sweep_once(state: &AppState) {
    let now = now_ms();
    for (code, handle) in state.registry.snapshot().await {
        let reason = {
            let session = handle.lock().await;
            let grace_expired = session
                .host_detached_at_ms
                .is_some_and(|at| now - at >= state.config.host_resume_grace_ms as i64);
            let idle_expired = now - session.last_activity_ms >= state.config.session_ttl_ms as i64;
            if grace_expired {
                Some("host-timeout")
            } else if idle_expired {
                Some("session-expired")
            } else {
                None
            }
        };
        if let Some(reason) = reason {
            info!(session_code = %code, reason, "expiring session");
            lifecycle::terminate_session(state, &code, reason).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use crate::RelayConfig;

    async fn ended_reason(mut rx: tokio::sync::mpsc::Receiver<Outbound>) -> String {
        loop {
            match rx.recv().await.expect("expected an outbound frame") {
                Outbound::Text(json) => {
                    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                    if value["type"] == "session:ended" {
                        return value["payload"]["reason"].as_str().unwrap().to_owned();
                    }
                }
                Outbound::Close { .. } => panic!("expected session:ended before close"),
                Outbound::Ping => {}
            }
        }
    }

    #[tokio::test]
    async fn sweeps_a_host_detached_past_grace_with_host_timeout() {
        let mut config = RelayConfig::default();
        config.host_resume_grace_ms = 1;
        config.session_ttl_ms = 6 * 60 * 60 * 1000;
        let state = AppState::new(config);

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let (code, handle) = state.registry.create(6, tx, 10_000).await;
        {
            let mut session = handle.lock().await;
            session.host_detached_at_ms = Some(now_ms() - 10_000);
        }

        sweep_once(&state).await;

        assert!(state.registry.get(&code).await.is_none());
        assert_eq!(ended_reason(rx).await, "host-timeout");
    }

    #[tokio::test]
    async fn sweeps_an_idle_session_with_session_expired() {
        let mut config = RelayConfig::default();
        config.session_ttl_ms = 1;
        let state = AppState::new(config);

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let (code, handle) = state.registry.create(6, tx, 10_000).await;
        {
            let mut session = handle.lock().await;
            session.last_activity_ms = now_ms() - 10_000;
        }

        sweep_once(&state).await;

        assert!(state.registry.get(&code).await.is_none());
        assert_eq!(ended_reason(rx).await, "session-expired");
    }

    #[tokio::test]
    async fn grace_expiry_takes_priority_over_idle_expiry() {
        let mut config = RelayConfig::default();
        config.host_resume_grace_ms = 1;
        config.session_ttl_ms = 1;
        let state = AppState::new(config);

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let (code, handle) = state.registry.create(6, tx, 10_000).await;
        {
            let mut session = handle.lock().await;
            session.host_detached_at_ms = Some(now_ms() - 10_000);
            session.last_activity_ms = now_ms() - 10_000;
        }

        sweep_once(&state).await;

        assert!(state.registry.get(&code).await.is_none());
        assert_eq!(ended_reason(rx).await, "host-timeout");
    }

    #[tokio::test]
    async fn a_fresh_session_is_not_swept() {
        let state = AppState::new(RelayConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let (code, _handle) = state.registry.create(6, tx, 10_000).await;

        sweep_once(&state).await;

        assert!(state.registry.get(&code).await.is_some());
    }
}
