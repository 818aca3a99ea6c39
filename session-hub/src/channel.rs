use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use transcript_pipeline::TranscriptSegment;
use uuid::Uuid;

use crate::role::Role;
use crate::state::SessionState;

/// Message delivered to an attached participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A partial or final transcript segment, in pipeline seq order.
    Transcript(TranscriptSegment),
    /// Session lifecycle notification.
    Status {
        session_id: Uuid,
        state: SessionState,
        reason: Option<String>,
    },
    /// Relayed chat message from another participant. Transient; never
    /// persisted or logged.
    Chat {
        session_id: Uuid,
        sender_id: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
}

/// What a connecting participant gets back from `attach`: the
/// receiving end of the session's outbound stream for them. Dropping
/// the handle is equivalent to disconnecting.
pub struct ChannelHandle {
    pub session_id: Uuid,
    pub participant_id: String,
    pub role: Role,
    pub receiver: mpsc::Receiver<OutboundMessage>,
}

/// Hub-side state for one connected endpoint.
///
/// Holds only the session id as a key, never a reference to the
/// session, so there are no ownership cycles.
pub struct ParticipantChannel {
    pub participant_id: String,
    pub role: Role,
    sender: mpsc::Sender<OutboundMessage>,
    live: bool,
    pub last_activity: DateTime<Utc>,
}

impl ParticipantChannel {
    /// Create the channel pair; the returned handle goes back to the
    /// transport collaborator.
    pub fn attach(
        session_id: Uuid,
        participant_id: String,
        role: Role,
        capacity: usize,
    ) -> (Self, ChannelHandle) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let channel = Self {
            participant_id: participant_id.clone(),
            role,
            sender,
            live: true,
            last_activity: Utc::now(),
        };
        let handle = ChannelHandle {
            session_id,
            participant_id,
            role,
            receiver,
        };
        (channel, handle)
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Mark the channel dead. Idempotent.
    pub fn detach(&mut self) {
        self.live = false;
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Non-blocking delivery so one slow consumer can never stall the
    /// session's mutation path. A full queue drops this message for
    /// this participant; a closed queue marks the channel dead.
    pub fn deliver(&mut self, message: OutboundMessage) {
        if !self.live {
            return;
        }
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    participant_id = %self.participant_id,
                    "outbound queue full, dropping message"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    participant_id = %self.participant_id,
                    "outbound queue closed, detaching channel"
                );
                self.live = false;
            }
        }
    }
}
