use crate::debugger::session::{DebugSession, SessionId};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};

/// Process wide map of live sessions.
///
/// Sessions are never removed, they live as long as the registry itself.
pub struct SessionRegistry {
    sessions: Mutex<IndexMap<SessionId, Arc<DebugSession>>>,
    stack_size: usize,
}

impl SessionRegistry {
    /// Create an empty registry, `stack_size` is applied to every session execution thread.
    pub fn new(stack_size: usize) -> Self {
        Self {
            sessions: Mutex::default(),
            stack_size,
        }
    }

    pub fn create(&self) -> Arc<DebugSession> {
        let session = Arc::new(DebugSession::new(self.stack_size));
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id(), session.clone());
        log::info!(target: "debugger", "session {} created", session.id());
        session
    }

    /// List session identifiers in creation order.
    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.lock().unwrap().keys().copied().collect()
    }

    /// Find a session by its textual identifier, malformed identifiers are never found.
    pub fn get(&self, id: &str) -> Option<Arc<DebugSession>> {
        let id: SessionId = crate::muted_error!(id.parse(), "malformed session id:")?;
        self.sessions.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
