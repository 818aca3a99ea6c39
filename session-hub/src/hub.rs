use std::sync::Arc;
use std::time::Duration;

use audit_chain::{AuditAction, AuditEntry, AuditEvent, AuditOutcome, AuditRecorder, ChainStatus};
use phi_vault::{CryptoVault, FieldContext};
use tokio::time;
use tracing::{info, warn};
use transcript_pipeline::{
    AudioChunk, PipelineConfig, PipelineError, RecognitionEngine, SessionPipeline,
};
use uuid::Uuid;

use crate::channel::{ChannelHandle, OutboundMessage, ParticipantChannel};
use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::persistence::{RecordStore, StoredField};
use crate::registry::SessionRegistry;
use crate::role::Role;
use crate::session::Session;
use crate::state::{CancelReason, SessionState};

/// Orchestrates all live consultations.
///
/// Routes events between participants, the transcription pipeline, the
/// PHI vault, the audit chain, and the persistence collaborator. Every
/// state transition is audited before it commits; an audit failure
/// leaves the session in its prior state and surfaces
/// `AuditWriteFailure`.
pub struct SessionHub {
    registry: Arc<SessionRegistry>,
    vault: Arc<CryptoVault>,
    audit: Arc<AuditRecorder>,
    records: Arc<dyn RecordStore>,
    engine: Arc<dyn RecognitionEngine>,
    config: HubConfig,
    pipeline_config: PipelineConfig,
}

impl SessionHub {
    pub fn new(
        vault: Arc<CryptoVault>,
        audit: Arc<AuditRecorder>,
        records: Arc<dyn RecordStore>,
        engine: Arc<dyn RecognitionEngine>,
        config: HubConfig,
        pipeline_config: PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(SessionRegistry::new()),
            vault,
            audit,
            records,
            engine,
            config,
            pipeline_config,
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn vault(&self) -> &CryptoVault {
        &self.vault
    }

    /// A patient requests a consultation. Creates the session in
    /// `Requested`, encrypts and persists the symptoms text, and arms
    /// the acceptance-window timer.
    pub async fn request_consultation(
        self: &Arc<Self>,
        patient_id: &str,
        symptoms: &str,
    ) -> HubResult<Uuid> {
        let session_id = Uuid::new_v4();

        // Audit first: if this fails there is no session to roll back.
        self.audit
            .record(AuditEvent::success(
                patient_id,
                AuditAction::ConsultationRequested,
                subject(session_id),
            ))
            .await?;

        let pipeline =
            SessionPipeline::new(session_id, self.pipeline_config.clone(), self.engine.clone());
        let patient = patient_id.to_string();
        self.registry
            .find_or_create(session_id, move || Session::new(session_id, patient, pipeline));

        self.persist_field(session_id, patient_id, "symptoms", symptoms)
            .await?;
        self.arm_window_timer(session_id, SessionState::Requested);

        info!(session_id = %session_id, "consultation requested");
        Ok(session_id)
    }

    /// A provider claims a requested consultation.
    pub async fn accept_consultation(
        self: &Arc<Self>,
        session_id: Uuid,
        provider_id: &str,
    ) -> HubResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        match guard.state() {
            SessionState::Requested => {}
            state if state.is_terminal() => {
                return Err(HubError::AlreadyTerminal { session_id });
            }
            state => {
                return Err(HubError::SessionNotActive { session_id, state });
            }
        }

        self.audit
            .record(AuditEvent::success(
                provider_id,
                AuditAction::ConsultationAccepted,
                subject(session_id),
            ))
            .await?;
        guard.set_provider(provider_id.to_string());
        guard.commit_state(SessionState::Accepted);
        drop(guard);

        // Both parties now have the acceptance window to connect.
        self.arm_window_timer(session_id, SessionState::Accepted);
        info!(session_id = %session_id, "consultation accepted");
        Ok(())
    }

    /// The bound provider hands the consultation to another provider.
    ///
    /// Permitted while `Accepted` or `Active`. Records one audit entry
    /// per provider, detaches the outgoing provider's channel, and
    /// rebinds the session; the incoming provider attaches afterwards
    /// like any accepted consultation.
    pub async fn transfer_consultation(
        &self,
        session_id: Uuid,
        from_provider: &str,
        to_provider: &str,
    ) -> HubResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        match guard.state() {
            SessionState::Accepted | SessionState::Active => {}
            state if state.is_terminal() => {
                return Err(HubError::AlreadyTerminal { session_id });
            }
            state => {
                return Err(HubError::SessionNotActive { session_id, state });
            }
        }

        let authorized = matches!(
            guard.role_of(from_provider),
            Some(role) if role.can_transfer_session()
        );
        if !authorized {
            self.audit
                .record(AuditEvent::new(
                    from_provider,
                    AuditAction::ConsultationTransferred,
                    subject(session_id),
                    AuditOutcome::Denied,
                ))
                .await?;
            return Err(HubError::PermissionDenied {
                participant_id: from_provider.to_string(),
                action: "transfer this consultation",
            });
        }

        let outgoing_live = guard
            .channel_mut(from_provider)
            .map(|c| c.is_live())
            .unwrap_or(false);

        // Paired entries: one for the provider handing off, one for
        // the provider taking over.
        self.audit
            .record(AuditEvent::success(
                from_provider,
                AuditAction::ConsultationTransferred,
                format!("{}/to/{to_provider}", subject(session_id)),
            ))
            .await?;
        self.audit
            .record(AuditEvent::success(
                to_provider,
                AuditAction::ConsultationTransferred,
                format!("{}/from/{from_provider}", subject(session_id)),
            ))
            .await?;
        if outgoing_live {
            self.audit
                .record(AuditEvent::success(
                    from_provider,
                    AuditAction::ChannelDetached,
                    subject(session_id),
                ))
                .await?;
        }

        guard.remove_channel(from_provider);
        guard.set_provider(to_provider.to_string());
        let state = guard.state();
        guard.broadcast(&OutboundMessage::Status {
            session_id,
            state,
            reason: Some("transferred".to_string()),
        });

        info!(
            session_id = %session_id,
            from_provider,
            to_provider,
            "consultation transferred"
        );
        Ok(())
    }

    /// Attach a participant connection; identity and role come from
    /// the auth collaborator and are trusted here.
    ///
    /// Moves an `Accepted` session to `Active` once both the patient
    /// and the provider are connected.
    pub async fn attach(
        &self,
        session_id: Uuid,
        participant_id: &str,
        role: Role,
    ) -> HubResult<ChannelHandle> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        match guard.state() {
            SessionState::Accepted | SessionState::Active => {}
            state => {
                return Err(HubError::SessionNotActive { session_id, state });
            }
        }

        let identity_matches = match role {
            Role::Patient => guard.patient_id() == participant_id,
            Role::Provider => guard.provider_id() == Some(participant_id),
            Role::Observer => true,
        };
        if !identity_matches {
            self.audit
                .record(AuditEvent::new(
                    participant_id,
                    AuditAction::ChannelAttached,
                    subject(session_id),
                    AuditOutcome::Denied,
                ))
                .await?;
            return Err(HubError::PermissionDenied {
                participant_id: participant_id.to_string(),
                action: "attach with that role",
            });
        }

        self.audit
            .record(AuditEvent::success(
                participant_id,
                AuditAction::ChannelAttached,
                subject(session_id),
            ))
            .await?;

        let (channel, handle) = ParticipantChannel::attach(
            session_id,
            participant_id.to_string(),
            role,
            self.config.channel_capacity,
        );
        guard.insert_channel(channel);

        if guard.state() == SessionState::Accepted && guard.both_parties_live() {
            self.audit
                .record(AuditEvent::success(
                    "system",
                    AuditAction::SessionActivated,
                    subject(session_id),
                ))
                .await?;
            guard.commit_state(SessionState::Active);
            guard.broadcast(&OutboundMessage::Status {
                session_id,
                state: SessionState::Active,
                reason: None,
            });
            info!(session_id = %session_id, "session active");
        }

        Ok(handle)
    }

    /// Detach a participant connection. Idempotent: detaching an
    /// already-detached channel is a no-op. When the last live channel
    /// of an `Active` session goes away, the session ends.
    pub async fn detach(self: &Arc<Self>, session_id: Uuid, participant_id: &str) -> HubResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        let live = guard
            .channel_mut(participant_id)
            .map(|c| c.is_live())
            .unwrap_or(false);
        if !live {
            return Ok(());
        }

        // Audited before the channel state changes, like every other
        // audited action.
        self.audit
            .record(AuditEvent::success(
                participant_id,
                AuditAction::ChannelDetached,
                subject(session_id),
            ))
            .await?;
        guard.detach_channel(participant_id);

        if guard.state() == SessionState::Active && guard.live_channel_count() == 0 {
            self.end_locked(&mut guard, "system", Some("participants-disconnected"))
                .await?;
        }
        Ok(())
    }

    /// Deliver one audio chunk into the session's pipeline and fan the
    /// resulting transcript segments out to every attached channel.
    pub async fn submit_audio_chunk(
        &self,
        session_id: Uuid,
        participant_id: &str,
        chunk: AudioChunk,
    ) -> HubResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        if guard.state() != SessionState::Active {
            return Err(HubError::SessionNotActive {
                session_id,
                state: guard.state(),
            });
        }

        let streaming_allowed = guard
            .channel_mut(participant_id)
            .filter(|c| c.is_live())
            .map(|c| {
                c.touch();
                c.role.can_stream_audio()
            })
            .unwrap_or(false);
        if !streaming_allowed {
            self.audit
                .record(AuditEvent::new(
                    participant_id,
                    AuditAction::AudioChunkDropped,
                    format!("{}/chunk/{}", subject(session_id), chunk.seq),
                    AuditOutcome::Denied,
                ))
                .await?;
            return Err(HubError::PermissionDenied {
                participant_id: participant_id.to_string(),
                action: "stream audio",
            });
        }

        let seq = chunk.seq;
        let output = match guard.pipeline_mut().ingest(chunk).await {
            Ok(output) => output,
            Err(PipelineError::SequenceWindowExceeded { seq, next }) => {
                // Stale chunk: dropped and audited, session continues.
                warn!(session_id = %session_id, seq, next, "stale audio chunk dropped");
                self.audit
                    .record(AuditEvent::new(
                        participant_id,
                        AuditAction::AudioChunkDropped,
                        format!("{}/chunk/{}", subject(session_id), seq),
                        AuditOutcome::Error,
                    ))
                    .await?;
                return Err(HubError::SequenceWindowExceeded { seq });
            }
            Err(PipelineError::SessionClosed) => {
                return Err(HubError::SessionNotActive {
                    session_id,
                    state: guard.state(),
                });
            }
        };

        if output.skipped > 0 {
            self.audit
                .record(AuditEvent::new(
                    participant_id,
                    AuditAction::AudioChunkDropped,
                    format!("{}/gap-before/{}", subject(session_id), seq),
                    AuditOutcome::Error,
                ))
                .await?;
        }

        for segment in output.segments {
            if segment.is_final() {
                if segment.degraded {
                    self.audit
                        .record(AuditEvent::new(
                            "system",
                            AuditAction::RecognitionDegraded,
                            format!("{}/segment/{}", subject(session_id), segment.seq),
                            AuditOutcome::Error,
                        ))
                        .await?;
                }
                guard.push_final(segment.clone());
            }
            guard.broadcast(&OutboundMessage::Transcript(segment));
        }

        Ok(())
    }

    /// A consultation party ends the session. From `Active` this ends
    /// it; from `Requested` or `Accepted` it withdraws it. Only the
    /// patient and the bound provider carry the end capability;
    /// everyone else gets an audited denial.
    pub async fn request_end(self: &Arc<Self>, session_id: Uuid, actor_id: &str) -> HubResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        let authorized = matches!(
            guard.role_of(actor_id),
            Some(role) if role.can_end_session()
        );
        if !authorized {
            let action = if guard.state() == SessionState::Active {
                AuditAction::SessionEnded
            } else {
                AuditAction::SessionCancelled
            };
            self.audit
                .record(AuditEvent::new(
                    actor_id,
                    action,
                    subject(session_id),
                    AuditOutcome::Denied,
                ))
                .await?;
            return Err(HubError::PermissionDenied {
                participant_id: actor_id.to_string(),
                action: "end this session",
            });
        }

        match guard.state() {
            state if state.is_terminal() => Err(HubError::AlreadyTerminal { session_id }),
            SessionState::Active => self.end_locked(&mut guard, actor_id, None).await,
            _ => {
                self.cancel_locked(&mut guard, actor_id, CancelReason::Withdrawn)
                    .await
            }
        }
    }

    /// The provider appends clinical notes to the consultation record.
    pub async fn save_notes(
        &self,
        session_id: Uuid,
        participant_id: &str,
        notes: &str,
    ) -> HubResult<()> {
        let session = self.session(session_id)?;
        let guard = session.lock().await;

        if guard.state() != SessionState::Active {
            return Err(HubError::SessionNotActive {
                session_id,
                state: guard.state(),
            });
        }
        let allowed = matches!(
            guard.role_of(participant_id),
            Some(role) if role.can_write_notes()
        );
        drop(guard);
        if !allowed {
            self.audit
                .record(AuditEvent::new(
                    participant_id,
                    AuditAction::RecordWritten,
                    format!("{}/notes", subject(session_id)),
                    AuditOutcome::Denied,
                ))
                .await?;
            return Err(HubError::PermissionDenied {
                participant_id: participant_id.to_string(),
                action: "write clinical notes",
            });
        }

        self.persist_field(session_id, participant_id, "notes", notes)
            .await
    }

    /// Read and decrypt the consultation record for an authorized
    /// participant. The access itself is audited.
    pub async fn load_record(
        &self,
        session_id: Uuid,
        actor_id: &str,
    ) -> HubResult<Vec<(String, String)>> {
        let session = self.session(session_id)?;
        let guard = session.lock().await;
        let allowed = matches!(
            guard.role_of(actor_id),
            Some(role) if role.can_view_record()
        );
        drop(guard);

        if !allowed {
            self.audit
                .record(AuditEvent::new(
                    actor_id,
                    AuditAction::RecordViewed,
                    subject(session_id),
                    AuditOutcome::Denied,
                ))
                .await?;
            return Err(HubError::PermissionDenied {
                participant_id: actor_id.to_string(),
                action: "view the consultation record",
            });
        }

        let fields = self.records.load_encrypted_record(session_id).await?;

        let mut decrypted = Vec::with_capacity(fields.len());
        let mut failure = None;
        for stored in fields {
            let ctx = FieldContext::new(session_id.to_string(), stored.name.clone());
            match self.vault.decrypt(&stored.field, &ctx) {
                Ok(plaintext) => decrypted.push((stored.name, plaintext)),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let outcome = if failure.is_none() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Error
        };
        self.audit
            .record(AuditEvent::new(
                actor_id,
                AuditAction::RecordViewed,
                subject(session_id),
                outcome,
            ))
            .await?;

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(decrypted),
        }
    }

    /// Relay a chat message to everyone in an active session. The text
    /// stays in flight only; it is never persisted or logged.
    pub async fn send_chat(
        &self,
        session_id: Uuid,
        sender_id: &str,
        text: &str,
    ) -> HubResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.lock().await;

        if guard.state() != SessionState::Active {
            return Err(HubError::SessionNotActive {
                session_id,
                state: guard.state(),
            });
        }
        let sender_attached = guard
            .channel_mut(sender_id)
            .map(|c| c.is_live())
            .unwrap_or(false);
        if !sender_attached {
            return Err(HubError::PermissionDenied {
                participant_id: sender_id.to_string(),
                action: "chat in this session",
            });
        }

        guard.broadcast(&OutboundMessage::Chat {
            session_id,
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Read-only view of the audit trail, `start <= index < end`.
    pub async fn get_audit_trail(&self, start: u64, end: u64) -> HubResult<Vec<AuditEntry>> {
        Ok(self.audit.trail(start, end).await?)
    }

    /// Recompute the audit chain over a range; compliance tooling
    /// entry point.
    pub async fn verify_audit_chain(&self, start: u64, end: u64) -> HubResult<ChainStatus> {
        Ok(self.audit.verify_chain(start, end).await?)
    }

    /// Rotate the vault's active key; audited like any other sensitive
    /// action.
    pub async fn rotate_key(&self, actor_id: &str) -> HubResult<u32> {
        let version = self.vault.rotate_key();
        self.audit
            .record(AuditEvent::success(
                actor_id,
                AuditAction::KeyRotated,
                format!("vault/key/v{version}"),
            ))
            .await?;
        Ok(version)
    }

    fn session(&self, session_id: Uuid) -> HubResult<Arc<tokio::sync::Mutex<Session>>> {
        self.registry
            .get(session_id)
            .ok_or(HubError::UnknownSession(session_id))
    }

    /// Encrypt one PHI value and hand it to the persistence
    /// collaborator; the write (or its failure) is audited.
    async fn persist_field(
        &self,
        session_id: Uuid,
        actor_id: &str,
        name: &str,
        plaintext: &str,
    ) -> HubResult<()> {
        let ctx = FieldContext::new(session_id.to_string(), name);
        let encrypted = self.vault.encrypt(plaintext, &ctx)?;

        let result = self
            .records
            .save_encrypted_record(
                session_id,
                vec![StoredField {
                    name: name.to_string(),
                    field: encrypted,
                }],
            )
            .await;

        let outcome = if result.is_ok() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Error
        };
        self.audit
            .record(AuditEvent::new(
                actor_id,
                AuditAction::RecordWritten,
                format!("{}/{name}", subject(session_id)),
                outcome,
            ))
            .await?;

        result.map_err(Into::into)
    }

    /// End an active session: audit, commit, drain the pipeline within
    /// the grace timeout, persist the assembled transcript, notify and
    /// detach everyone, and schedule registry removal.
    async fn end_locked(
        self: &Arc<Self>,
        guard: &mut Session,
        actor_id: &str,
        reason: Option<&str>,
    ) -> HubResult<()> {
        let session_id = guard.id();

        self.audit
            .record(AuditEvent::success(
                actor_id,
                AuditAction::SessionEnded,
                subject(session_id),
            ))
            .await?;
        guard.commit_state(SessionState::Ended);

        // New chunks are already refused; let buffered recognition
        // drain, then abandon it at the grace deadline.
        let grace = Duration::from_secs(self.config.end_grace_secs.max(1));
        let finals = match time::timeout(grace, guard.pipeline_mut().flush()).await {
            Ok(finals) => finals,
            Err(_) => {
                warn!(session_id = %session_id, "recognition drain abandoned at grace deadline");
                Vec::new()
            }
        };
        for segment in finals {
            if segment.degraded {
                if let Err(err) = self
                    .audit
                    .record(AuditEvent::new(
                        "system",
                        AuditAction::RecognitionDegraded,
                        format!("{}/segment/{}", subject(session_id), segment.seq),
                        AuditOutcome::Error,
                    ))
                    .await
                {
                    warn!(session_id = %session_id, error = %err, "degraded-segment audit failed");
                }
            }
            guard.broadcast(&OutboundMessage::Transcript(segment.clone()));
            guard.push_final(segment);
        }

        // Channel teardown and registry removal run even when the
        // transcript write fails; a terminal session never keeps live
        // channels.
        let transcript = guard.transcript_text();
        let persisted = if transcript.is_empty() {
            Ok(())
        } else {
            self.persist_field(session_id, actor_id, "transcript", &transcript)
                .await
        };

        guard.broadcast(&OutboundMessage::Status {
            session_id,
            state: SessionState::Ended,
            reason: reason.map(str::to_string),
        });
        guard.detach_all();
        self.schedule_removal(session_id);

        info!(session_id = %session_id, "session ended");
        persisted
    }

    /// Cancel a not-yet-active session with a reason code.
    async fn cancel_locked(
        self: &Arc<Self>,
        guard: &mut Session,
        actor_id: &str,
        reason: CancelReason,
    ) -> HubResult<()> {
        let session_id = guard.id();

        self.audit
            .record(AuditEvent::success(
                actor_id,
                AuditAction::SessionCancelled,
                format!("{}/cancel/{}", subject(session_id), reason.as_str()),
            ))
            .await?;
        guard.set_cancel_reason(reason);
        guard.commit_state(SessionState::Cancelled);

        guard.broadcast(&OutboundMessage::Status {
            session_id,
            state: SessionState::Cancelled,
            reason: Some(reason.as_str().to_string()),
        });
        guard.detach_all();
        self.schedule_removal(session_id);

        info!(session_id = %session_id, reason = reason.as_str(), "session cancelled");
        Ok(())
    }

    /// Cancel the session if the acceptance window elapsed with it
    /// still parked in `armed_state`.
    async fn cancel_if_still(
        self: &Arc<Self>,
        session_id: Uuid,
        armed_state: SessionState,
    ) -> HubResult<()> {
        let Some(session) = self.registry.get(session_id) else {
            return Ok(());
        };
        let mut guard = session.lock().await;
        if guard.state() != armed_state {
            return Ok(());
        }
        self.cancel_locked(&mut guard, "system", CancelReason::WindowExpired)
            .await
    }

    fn arm_window_timer(self: &Arc<Self>, session_id: Uuid, armed_state: SessionState) {
        let hub = self.clone();
        let window = Duration::from_secs(self.config.acceptance_window_secs);
        tokio::spawn(async move {
            time::sleep(window).await;
            if let Err(err) = hub.cancel_if_still(session_id, armed_state).await {
                warn!(session_id = %session_id, error = %err, "window-expiry cancellation failed");
            }
        });
    }

    /// Terminal sessions linger for the grace period so late finals
    /// can still be read, then leave the registry.
    fn schedule_removal(self: &Arc<Self>, session_id: Uuid) {
        let hub = self.clone();
        let grace = Duration::from_secs(self.config.end_grace_secs);
        tokio::spawn(async move {
            time::sleep(grace).await;
            match hub.registry.remove(session_id).await {
                Ok(()) | Err(HubError::UnknownSession(_)) => {}
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "session removal failed");
                }
            }
        });
    }
}

fn subject(session_id: Uuid) -> String {
    format!("consultation/{session_id}")
}
