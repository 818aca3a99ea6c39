use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of auditable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ConsultationRequested,
    ConsultationAccepted,
    ConsultationTransferred,
    SessionActivated,
    SessionEnded,
    SessionCancelled,
    ChannelAttached,
    ChannelDetached,
    RecordWritten,
    RecordViewed,
    AudioChunkDropped,
    RecognitionDegraded,
    KeyRotated,
}

impl AuditAction {
    /// Stable name used in the canonical hash encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsultationRequested => "consultation_requested",
            Self::ConsultationAccepted => "consultation_accepted",
            Self::ConsultationTransferred => "consultation_transferred",
            Self::SessionActivated => "session_activated",
            Self::SessionEnded => "session_ended",
            Self::SessionCancelled => "session_cancelled",
            Self::ChannelAttached => "channel_attached",
            Self::ChannelDetached => "channel_detached",
            Self::RecordWritten => "record_written",
            Self::RecordViewed => "record_viewed",
            Self::AudioChunkDropped => "audio_chunk_dropped",
            Self::RecognitionDegraded => "recognition_degraded",
            Self::KeyRotated => "key_rotated",
        }
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

/// What a caller submits for recording; index, timestamp, and chain
/// hashes are assigned by the recorder.
///
/// The subject names the session or record acted on, never a PHI
/// value: `"consultation/42/symptoms"`, not the symptoms text.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: String,
    pub action: AuditAction,
    pub subject: String,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn new(
        actor_id: impl Into<String>,
        action: AuditAction,
        subject: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action,
            subject: subject.into(),
            outcome,
        }
    }

    pub fn success(
        actor_id: impl Into<String>,
        action: AuditAction,
        subject: impl Into<String>,
    ) -> Self {
        Self::new(actor_id, action, subject, AuditOutcome::Success)
    }
}

/// One immutable record in the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the append-only log, starting at 0.
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub action: AuditAction,
    pub subject: String,
    pub outcome: AuditOutcome,
    /// Hex SHA-256 hash of the previous entry (all zeros for index 0).
    pub prev_hash: String,
    /// Hex SHA-256 over `prev_hash` plus this entry's canonical bytes.
    pub hash: String,
}

impl AuditEntry {
    /// Canonical byte encoding hashed into the chain.
    ///
    /// Every field is length-prefixed so the encoding is unambiguous
    /// and independent of any serializer's field ordering. The
    /// timestamp is fixed to microsecond RFC 3339 so re-encoding is
    /// deterministic.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.index.to_le_bytes());

        let fields: [&str; 5] = [
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            &self.actor_id,
            self.action.as_str(),
            &self.subject,
            self.outcome.as_str(),
        ];
        for field in fields {
            out.extend_from_slice(&(field.len() as u64).to_le_bytes());
            out.extend_from_slice(field.as_bytes());
        }
        out
    }
}
