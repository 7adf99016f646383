use dashmap::DashMap;
use maestro_workflow::SessionController;
use std::sync::Arc;

/// Controllers for every live session, shared across connections so a
/// clarification answer or cancel can arrive on a different socket than
/// the one streaming events.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<String, SessionController>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, controller: SessionController) {
        self.inner
            .insert(controller.session_id().to_string(), controller);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionController> {
        self.inner.get(session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.inner.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
