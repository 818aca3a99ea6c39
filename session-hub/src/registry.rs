use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{HubError, HubResult};
use crate::session::Session;

/// Process-wide directory of active sessions.
///
/// The registry holds shared references only; state mutation always
/// goes through the per-session mutex owned by the hub logic. Sessions
/// are destroyed nowhere else.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<Mutex<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing session or atomically create one via
    /// `make`. Concurrent calls for the same unseen id observe exactly
    /// one creation; `make` runs at most once.
    pub fn find_or_create(
        &self,
        session_id: Uuid,
        make: impl FnOnce() -> Session,
    ) -> (Arc<Mutex<Session>>, bool) {
        match self.sessions.entry(session_id) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                debug!(session_id = %session_id, "creating session");
                let session = Arc::new(Mutex::new(make()));
                vacant.insert(session.clone());
                (session, true)
            }
        }
    }

    pub fn get(&self, session_id: Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(&session_id).map(|r| r.value().clone())
    }

    /// Remove a terminal session from the directory.
    ///
    /// Removing a non-terminal session is a programming error and
    /// fails with `InvariantViolation` without touching the map.
    pub async fn remove(&self, session_id: Uuid) -> HubResult<()> {
        let session = self
            .get(session_id)
            .ok_or(HubError::UnknownSession(session_id))?;

        {
            let guard = session.lock().await;
            if !guard.state().is_terminal() {
                return Err(HubError::InvariantViolation(format!(
                    "attempted to remove non-terminal session {session_id} in state {:?}",
                    guard.state()
                )));
            }
        }

        self.sessions.remove(&session_id);
        debug!(session_id = %session_id, "session removed from registry");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
