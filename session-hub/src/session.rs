use std::collections::HashMap;

use chrono::{DateTime, Utc};
use transcript_pipeline::{SessionPipeline, TranscriptSegment};
use uuid::Uuid;

use crate::channel::{OutboundMessage, ParticipantChannel};
use crate::role::Role;
use crate::state::{CancelReason, SessionState};

/// One active consultation.
///
/// Owned exclusively by the hub behind an `Arc<tokio::Mutex<_>>` held
/// in the registry; every mutation happens under that lock, so a
/// session's operations are serialized while different sessions run in
/// parallel.
pub struct Session {
    id: Uuid,
    patient_id: String,
    provider_id: Option<String>,
    state: SessionState,
    cancel_reason: Option<CancelReason>,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    channels: HashMap<String, ParticipantChannel>,
    pipeline: SessionPipeline,
    finals: Vec<TranscriptSegment>,
}

impl Session {
    pub fn new(id: Uuid, patient_id: String, pipeline: SessionPipeline) -> Self {
        Self {
            id,
            patient_id,
            provider_id: None,
            state: SessionState::Requested,
            cancel_reason: None,
            created_at: Utc::now(),
            ended_at: None,
            channels: HashMap::new(),
            pipeline,
            finals: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn pipeline_mut(&mut self) -> &mut SessionPipeline {
        &mut self.pipeline
    }

    /// Final transcript segments committed so far, in seq order.
    pub fn finals(&self) -> &[TranscriptSegment] {
        &self.finals
    }

    /// Commit a validated transition. The hub audits before calling
    /// this; the state must already have passed `can_transition_to`.
    pub(crate) fn commit_state(&mut self, next: SessionState) {
        debug_assert!(self.state.can_transition_to(next));
        self.state = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub(crate) fn set_provider(&mut self, provider_id: String) {
        self.provider_id = Some(provider_id);
    }

    pub(crate) fn set_cancel_reason(&mut self, reason: CancelReason) {
        self.cancel_reason = Some(reason);
    }

    pub(crate) fn insert_channel(&mut self, channel: ParticipantChannel) {
        self.channels.insert(channel.participant_id.clone(), channel);
    }

    pub(crate) fn channel_mut(&mut self, participant_id: &str) -> Option<&mut ParticipantChannel> {
        self.channels.get_mut(participant_id)
    }

    /// Role this participant holds in the session: the consultation
    /// parties by identity, anyone else by their attached channel.
    pub fn role_of(&self, participant_id: &str) -> Option<Role> {
        if self.patient_id == participant_id {
            Some(Role::Patient)
        } else if self.provider_id.as_deref() == Some(participant_id) {
            Some(Role::Provider)
        } else {
            self.channels.get(participant_id).map(|c| c.role)
        }
    }

    /// Drop a participant's channel entry entirely, as when a
    /// transferred provider leaves. Returns whether it was live.
    pub(crate) fn remove_channel(&mut self, participant_id: &str) -> bool {
        self.channels
            .remove(participant_id)
            .map(|c| c.is_live())
            .unwrap_or(false)
    }

    /// Detach one channel; true if it was live. Idempotent.
    pub(crate) fn detach_channel(&mut self, participant_id: &str) -> bool {
        match self.channels.get_mut(participant_id) {
            Some(channel) if channel.is_live() => {
                channel.detach();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn detach_all(&mut self) {
        for channel in self.channels.values_mut() {
            channel.detach();
        }
    }

    pub fn live_channel_count(&self) -> usize {
        self.channels.values().filter(|c| c.is_live()).count()
    }

    fn has_live(&self, role: Role) -> bool {
        self.channels
            .values()
            .any(|c| c.is_live() && c.role == role)
    }

    /// Both consultation parties connected; precondition for `Active`.
    pub fn both_parties_live(&self) -> bool {
        self.has_live(Role::Patient) && self.has_live(Role::Provider)
    }

    /// Deliver a message to every live channel, non-blocking.
    pub(crate) fn broadcast(&mut self, message: &OutboundMessage) {
        for channel in self.channels.values_mut() {
            channel.deliver(message.clone());
        }
    }

    pub(crate) fn push_final(&mut self, segment: TranscriptSegment) {
        debug_assert!(self
            .finals
            .last()
            .map(|prev| prev.seq < segment.seq)
            .unwrap_or(true));
        self.finals.push(segment);
    }

    /// Authoritative session transcript: final texts joined in order.
    pub fn transcript_text(&self) -> String {
        self.finals
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
