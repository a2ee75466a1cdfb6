// Session Registry: a process-global mapping from session code to session
// record, with atomic create/lookup/terminate and periodic expiry sweeps.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::ids;
use crate::session::{OutboxHandle, Session};

pub type SessionHandle = Arc<Mutex<Session>>;

/// Owns every live session. Lookups are case-sensitive on the canonical
/// (uppercase) code; callers normalize inbound codes before querying.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh, collision-free code and register a new session bound
    /// to `host_outbox`. Retries on collision with a live session.
    pub async fn create(
        &self,
        code_length: usize,
        host_outbox: OutboxHandle,
        initial_interval_ms: u64,
    ) -> (String, SessionHandle) {
        let mut sessions = self.sessions.write().await;
        loop {
            let code = ids::generate_session_code(code_length);
            if sessions.contains_key(&code) {
                continue;
            }
            let session = Arc::new(Mutex::new(Session::new(
                code.clone(),
                host_outbox,
                initial_interval_ms,
            )));
            sessions.insert(code.clone(), Arc::clone(&session));
            return (code, session);
        }
    }

    pub async fn get(&self, code: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(code).cloned()
    }

    pub async fn delete(&self, code: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(code)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Snapshot of every live session handle, for the expiry sweep.
    pub async fn snapshot(&self) -> Vec<(String, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(code, handle)| (code.clone(), Arc::clone(handle)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> OutboxHandle {
        tokio::sync::mpsc::channel(8).0
    }

    #[tokio::test]
    async fn create_mints_an_uppercase_code_and_registers_it() {
        let registry = SessionRegistry::new();
        let (code, _handle) = registry.create(6, outbox(), 10_000).await;
        assert_eq!(code.len(), 6);
        assert_eq!(code, code.to_uppercase());
        assert!(registry.get(&code).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_the_session_and_get_returns_none() {
        let registry = SessionRegistry::new();
        let (code, _) = registry.create(6, outbox(), 10_000).await;
        assert!(registry.delete(&code).await.is_some());
        assert!(registry.get(&code).await.is_none());
    }

    #[tokio::test]
    async fn lookups_are_case_sensitive_on_the_canonical_code() {
        let registry = SessionRegistry::new();
        let (code, _) = registry.create(6, outbox(), 10_000).await;
        assert!(registry.get(&code.to_lowercase()).await.is_none());
        assert!(registry.get(&code).await.is_some());
    }
}
