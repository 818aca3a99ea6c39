use serde::{Deserialize, Serialize};

/// Consultation lifecycle state.
///
/// `Requested → Accepted → Active → Ended`, with `Cancelled` reachable
/// from `Requested` and `Accepted`. `Ended` and `Cancelled` are
/// terminal; a terminal session is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Requested,
    Accepted,
    Active,
    Ended,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }

    /// Whether the state machine permits moving to `next` from here.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Accepted)
                | (Self::Requested, Self::Cancelled)
                | (Self::Accepted, Self::Active)
                | (Self::Accepted, Self::Cancelled)
                | (Self::Active, Self::Ended)
        )
    }
}

/// Why a session moved to `Cancelled` instead of completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The requester (or an authorized party) withdrew the request.
    Withdrawn,
    /// No provider accepted, or a party failed to connect, within the
    /// configured acceptance window.
    WindowExpired,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Withdrawn => "withdrawn",
            Self::WindowExpired => "window_expired",
        }
    }
}
