use thiserror::Error;
use uuid::Uuid;

use crate::state::SessionState;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("session {session_id} is not in a state that permits this operation (currently {state:?})")]
    SessionNotActive {
        session_id: Uuid,
        state: SessionState,
    },

    #[error("session {session_id} is already in a terminal state")]
    AlreadyTerminal { session_id: Uuid },

    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    #[error("audio chunk {seq} fell outside the sequence window")]
    SequenceWindowExceeded { seq: u64 },

    #[error("participant '{participant_id}' may not {action}")]
    PermissionDenied {
        participant_id: String,
        action: &'static str,
    },

    #[error("audit write failed, action not committed: {0}")]
    AuditWriteFailure(#[from] audit_chain::AuditError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Vault(#[from] phi_vault::VaultError),

    #[error("persistence unavailable: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),
}

pub type HubResult<T> = Result<T, HubError>;
