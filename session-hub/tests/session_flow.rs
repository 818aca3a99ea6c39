//! End-to-end consultation flows against in-memory collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use audit_chain::{
    AuditAction, AuditEntry, AuditError, AuditOutcome, AuditRecorder, AuditResult, AuditStore,
    ChainStatus, MemoryAuditStore,
};
use phi_vault::{CryptoVault, FieldContext, VaultConfig};
use session_hub::{
    CancelReason, ChannelHandle, HubConfig, HubError, MemoryRecordStore, OutboundMessage,
    RecordStore, Role, SessionHub, SessionState,
};
use transcript_pipeline::{
    AudioChunk, AudioSpan, PipelineConfig, RecognitionEngine, RecognitionError,
};
use uuid::Uuid;

struct EchoEngine(&'static str);

#[async_trait]
impl RecognitionEngine for EchoEngine {
    async fn recognize(&self, _span: &AudioSpan) -> Result<String, RecognitionError> {
        Ok(self.0.to_string())
    }
}

/// Audit store whose appends can be switched to fail, for exercising
/// the audit-before-commit rollback path.
struct FlakyAuditStore {
    inner: MemoryAuditStore,
    failing: AtomicBool,
}

impl FlakyAuditStore {
    fn new() -> Self {
        Self {
            inner: MemoryAuditStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStore for FlakyAuditStore {
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::StorageUnavailable("injected outage".into()));
        }
        self.inner.append(entry).await
    }

    async fn load_range(&self, start: u64, end: u64) -> AuditResult<Vec<AuditEntry>> {
        self.inner.load_range(start, end).await
    }

    async fn len(&self) -> AuditResult<u64> {
        self.inner.len().await
    }
}

/// Record store whose writes can be switched to fail, for exercising
/// end-of-session cleanup under a persistence outage.
struct FlakyRecordStore {
    inner: MemoryRecordStore,
    failing: AtomicBool,
}

impl FlakyRecordStore {
    fn new() -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn save_encrypted_record(
        &self,
        session_id: Uuid,
        fields: Vec<session_hub::StoredField>,
    ) -> Result<(), session_hub::PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(session_hub::PersistenceError::Unavailable(
                "injected outage".into(),
            ));
        }
        self.inner.save_encrypted_record(session_id, fields).await
    }

    async fn load_encrypted_record(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<session_hub::StoredField>, session_hub::PersistenceError> {
        self.inner.load_encrypted_record(session_id).await
    }
}

struct Harness {
    hub: Arc<SessionHub>,
    recorder: Arc<AuditRecorder>,
    records: Arc<dyn RecordStore>,
}

async fn harness_with(
    store: Arc<dyn AuditStore>,
    records: Arc<dyn RecordStore>,
    hub_config: HubConfig,
) -> Harness {
    let recorder = Arc::new(AuditRecorder::new(store).await.unwrap());
    let hub = SessionHub::new(
        Arc::new(CryptoVault::generate(VaultConfig::default()).unwrap()),
        recorder.clone(),
        records.clone(),
        Arc::new(EchoEngine("the pain started tuesday")),
        hub_config,
        // Two chunks per span so a short chunk burst yields finals.
        PipelineConfig {
            max_span_chunks: 2,
            ..PipelineConfig::default()
        },
    );
    Harness {
        hub,
        recorder,
        records,
    }
}

async fn harness() -> Harness {
    harness_with(
        Arc::new(MemoryAuditStore::new()),
        Arc::new(MemoryRecordStore::new()),
        HubConfig {
            acceptance_window_secs: 3600,
            end_grace_secs: 1,
            channel_capacity: 64,
        },
    )
    .await
}

/// Drive a session to `Active` with both parties attached.
async fn activate(h: &Harness) -> (Uuid, ChannelHandle, ChannelHandle) {
    let session_id = h
        .hub
        .request_consultation("patient-1", "persistent migraine, photophobia")
        .await
        .unwrap();
    h.hub
        .accept_consultation(session_id, "provider-1")
        .await
        .unwrap();
    let patient = h.hub.attach(session_id, "patient-1", Role::Patient).await.unwrap();
    let provider = h
        .hub
        .attach(session_id, "provider-1", Role::Provider)
        .await
        .unwrap();
    (session_id, patient, provider)
}

async fn state_of(h: &Harness, session_id: Uuid) -> SessionState {
    h.hub
        .registry()
        .get(session_id)
        .unwrap()
        .lock()
        .await
        .state()
}

async fn audit_actions(h: &Harness) -> Vec<(AuditAction, AuditOutcome)> {
    let len = h.recorder.len().await.unwrap();
    h.recorder
        .trail(0, len)
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.action, e.outcome))
        .collect()
}

fn drain(handle: &mut ChannelHandle) -> Vec<OutboundMessage> {
    let mut out = Vec::new();
    while let Ok(message) = handle.receiver.try_recv() {
        out.push(message);
    }
    out
}

fn voiced(session_id: Uuid, seq: u64) -> AudioChunk {
    let payload = std::iter::repeat((i16::MAX / 3).to_le_bytes())
        .take(1600)
        .flatten()
        .collect();
    AudioChunk::new(session_id, seq, 16_000, payload)
}

fn silent(session_id: Uuid, seq: u64) -> AudioChunk {
    AudioChunk::new(session_id, seq, 16_000, vec![0; 3200])
}

#[tokio::test]
async fn full_consultation_produces_transcript_and_ordered_audit() {
    let h = harness().await;
    let (session_id, _patient, mut provider) = activate(&h).await;
    assert_eq!(state_of(&h, session_id).await, SessionState::Active);

    // Four voiced chunks close two spans of two chunks each.
    for seq in 0..4 {
        h.hub
            .submit_audio_chunk(session_id, "patient-1", voiced(session_id, seq))
            .await
            .unwrap();
    }
    h.hub.request_end(session_id, "provider-1").await.unwrap();
    assert_eq!(state_of(&h, session_id).await, SessionState::Ended);

    let messages = drain(&mut provider);
    let final_seqs: Vec<u64> = messages
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::Transcript(s) if s.is_final() => Some(s.seq),
            _ => None,
        })
        .collect();
    assert_eq!(final_seqs, vec![1, 3]);
    assert!(matches!(
        messages.last(),
        Some(OutboundMessage::Status {
            state: SessionState::Ended,
            ..
        })
    ));

    let actions: Vec<AuditAction> = audit_actions(&h).await.into_iter().map(|(a, _)| a).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::ConsultationRequested,
            AuditAction::RecordWritten,
            AuditAction::ConsultationAccepted,
            AuditAction::ChannelAttached,
            AuditAction::ChannelAttached,
            AuditAction::SessionActivated,
            AuditAction::SessionEnded,
            AuditAction::RecordWritten,
        ]
    );
    let len = h.recorder.len().await.unwrap();
    assert_eq!(
        h.recorder.verify_chain(0, len).await.unwrap(),
        ChainStatus::Valid
    );

    // The stored record holds ciphertext only; the vault round-trips it.
    let stored = h.records.load_encrypted_record(session_id).await.unwrap();
    let transcript = stored.iter().find(|f| f.name == "transcript").unwrap();
    assert!(!transcript.field.ciphertext.contains("pain"));
    let plaintext = h
        .hub
        .vault()
        .decrypt(
            &transcript.field,
            &FieldContext::new(session_id.to_string(), "transcript"),
        )
        .unwrap();
    assert_eq!(plaintext, "the pain started tuesday the pain started tuesday");
}

#[tokio::test]
async fn audit_outage_rolls_back_the_transition() {
    let store = Arc::new(FlakyAuditStore::new());
    let h = harness_with(
        store.clone(),
        Arc::new(MemoryRecordStore::new()),
        HubConfig {
            acceptance_window_secs: 3600,
            end_grace_secs: 1,
            channel_capacity: 64,
        },
    )
    .await;
    let (session_id, _patient, _provider) = activate(&h).await;

    store.set_failing(true);
    assert!(matches!(
        h.hub.request_end(session_id, "provider-1").await,
        Err(HubError::AuditWriteFailure(_))
    ));
    // The session is still live and usable.
    assert_eq!(state_of(&h, session_id).await, SessionState::Active);

    store.set_failing(false);
    h.hub
        .submit_audio_chunk(session_id, "patient-1", silent(session_id, 0))
        .await
        .unwrap();
    h.hub.request_end(session_id, "provider-1").await.unwrap();
    assert_eq!(state_of(&h, session_id).await, SessionState::Ended);
}

#[tokio::test(start_paused = true)]
async fn unaccepted_request_expires_into_cancelled() {
    let h = harness_with(
        Arc::new(MemoryAuditStore::new()),
        Arc::new(MemoryRecordStore::new()),
        HubConfig {
            acceptance_window_secs: 120,
            end_grace_secs: 3600,
            channel_capacity: 64,
        },
    )
    .await;
    let session_id = h
        .hub
        .request_consultation("patient-1", "chest tightness")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(121)).await;
    tokio::task::yield_now().await;

    let session = h.hub.registry().get(session_id).unwrap();
    {
        let guard = session.lock().await;
        assert_eq!(guard.state(), SessionState::Cancelled);
        assert_eq!(guard.cancel_reason(), Some(CancelReason::WindowExpired));
    }
    assert!(matches!(
        h.hub.accept_consultation(session_id, "provider-1").await,
        Err(HubError::AlreadyTerminal { .. })
    ));
    assert!(matches!(
        h.hub
            .submit_audio_chunk(session_id, "patient-1", voiced(session_id, 0))
            .await,
        Err(HubError::SessionNotActive {
            state: SessionState::Cancelled,
            ..
        })
    ));
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::SessionCancelled, AuditOutcome::Success)));
}

#[tokio::test]
async fn withdrawal_before_acceptance_cancels() {
    let h = harness().await;
    let session_id = h
        .hub
        .request_consultation("patient-1", "lower back pain")
        .await
        .unwrap();

    h.hub.request_end(session_id, "patient-1").await.unwrap();

    let session = h.hub.registry().get(session_id).unwrap();
    let guard = session.lock().await;
    assert_eq!(guard.state(), SessionState::Cancelled);
    assert_eq!(guard.cancel_reason(), Some(CancelReason::Withdrawn));
}

#[tokio::test]
async fn last_detach_ends_an_active_session() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    h.hub.detach(session_id, "patient-1").await.unwrap();
    assert_eq!(state_of(&h, session_id).await, SessionState::Active);

    h.hub.detach(session_id, "provider-1").await.unwrap();
    assert_eq!(state_of(&h, session_id).await, SessionState::Ended);

    // Re-detaching is a no-op, not an error.
    h.hub.detach(session_id, "provider-1").await.unwrap();
    let detaches = audit_actions(&h)
        .await
        .iter()
        .filter(|(a, _)| *a == AuditAction::ChannelDetached)
        .count();
    assert_eq!(detaches, 2);
}

#[tokio::test]
async fn stale_chunk_is_dropped_audited_and_survivable() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    h.hub
        .submit_audio_chunk(session_id, "patient-1", silent(session_id, 0))
        .await
        .unwrap();
    assert!(matches!(
        h.hub
            .submit_audio_chunk(session_id, "patient-1", silent(session_id, 0))
            .await,
        Err(HubError::SequenceWindowExceeded { seq: 0 })
    ));

    assert_eq!(state_of(&h, session_id).await, SessionState::Active);
    h.hub
        .submit_audio_chunk(session_id, "patient-1", silent(session_id, 1))
        .await
        .unwrap();
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::AudioChunkDropped, AuditOutcome::Error)));
}

#[tokio::test]
async fn observer_may_watch_but_not_stream() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;
    let _observer = h
        .hub
        .attach(session_id, "auditor-9", Role::Observer)
        .await
        .unwrap();

    assert!(matches!(
        h.hub
            .submit_audio_chunk(session_id, "auditor-9", voiced(session_id, 0))
            .await,
        Err(HubError::PermissionDenied { .. })
    ));
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::AudioChunkDropped, AuditOutcome::Denied)));
}

#[tokio::test]
async fn record_access_is_participant_only_and_audited() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    assert!(matches!(
        h.hub.load_record(session_id, "stranger-1").await,
        Err(HubError::PermissionDenied { .. })
    ));

    let record = h.hub.load_record(session_id, "patient-1").await.unwrap();
    let symptoms = record.iter().find(|(name, _)| name == "symptoms").unwrap();
    assert_eq!(symptoms.1, "persistent migraine, photophobia");

    let views: Vec<AuditOutcome> = audit_actions(&h)
        .await
        .into_iter()
        .filter(|(a, _)| *a == AuditAction::RecordViewed)
        .map(|(_, o)| o)
        .collect();
    assert_eq!(views, vec![AuditOutcome::Denied, AuditOutcome::Success]);
}

#[tokio::test]
async fn clinical_notes_are_provider_only() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    assert!(matches!(
        h.hub
            .save_notes(session_id, "patient-1", "self-diagnosis")
            .await,
        Err(HubError::PermissionDenied { .. })
    ));

    h.hub
        .save_notes(session_id, "provider-1", "suspected tension headache")
        .await
        .unwrap();
    let record = h.hub.load_record(session_id, "provider-1").await.unwrap();
    let notes = record.iter().find(|(name, _)| name == "notes").unwrap();
    assert_eq!(notes.1, "suspected tension headache");
}

#[tokio::test]
async fn chat_reaches_every_attached_participant() {
    let h = harness().await;
    let (session_id, mut patient, mut provider) = activate(&h).await;

    h.hub
        .send_chat(session_id, "patient-1", "can you hear me?")
        .await
        .unwrap();

    for handle in [&mut patient, &mut provider] {
        let chat = drain(handle)
            .into_iter()
            .find_map(|m| match m {
                OutboundMessage::Chat {
                    sender_id, text, ..
                } => Some((sender_id, text)),
                _ => None,
            })
            .unwrap();
        assert_eq!(chat, ("patient-1".to_string(), "can you hear me?".to_string()));
    }
}

#[tokio::test]
async fn attach_requires_the_session_identity() {
    let h = harness().await;
    let session_id = h
        .hub
        .request_consultation("patient-1", "rash on forearm")
        .await
        .unwrap();
    h.hub
        .accept_consultation(session_id, "provider-1")
        .await
        .unwrap();

    assert!(matches!(
        h.hub.attach(session_id, "impostor-1", Role::Patient).await,
        Err(HubError::PermissionDenied { .. })
    ));
    assert!(matches!(
        h.hub.attach(session_id, "provider-2", Role::Provider).await,
        Err(HubError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn operations_on_unknown_sessions_fail_cleanly() {
    let h = harness().await;
    let ghost = Uuid::new_v4();

    assert!(matches!(
        h.hub.accept_consultation(ghost, "provider-1").await,
        Err(HubError::UnknownSession(_))
    ));
    assert!(matches!(
        h.hub.request_end(ghost, "provider-1").await,
        Err(HubError::UnknownSession(_))
    ));
    assert!(matches!(
        h.hub.attach(ghost, "patient-1", Role::Patient).await,
        Err(HubError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn ending_twice_reports_already_terminal() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    h.hub.request_end(session_id, "provider-1").await.unwrap();
    assert!(matches!(
        h.hub.request_end(session_id, "patient-1").await,
        Err(HubError::AlreadyTerminal { .. })
    ));
}

#[tokio::test]
async fn audio_is_rejected_before_activation() {
    let h = harness().await;
    let session_id = h
        .hub
        .request_consultation("patient-1", "sore throat")
        .await
        .unwrap();
    h.hub
        .accept_consultation(session_id, "provider-1")
        .await
        .unwrap();
    let _patient = h.hub.attach(session_id, "patient-1", Role::Patient).await.unwrap();

    // Provider not attached yet: still Accepted, no audio allowed.
    assert!(matches!(
        h.hub
            .submit_audio_chunk(session_id, "patient-1", voiced(session_id, 0))
            .await,
        Err(HubError::SessionNotActive {
            state: SessionState::Accepted,
            ..
        })
    ));
}

#[tokio::test]
async fn only_consultation_parties_may_end() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;
    let _observer = h
        .hub
        .attach(session_id, "auditor-9", Role::Observer)
        .await
        .unwrap();

    for actor in ["mallory-9", "auditor-9"] {
        assert!(matches!(
            h.hub.request_end(session_id, actor).await,
            Err(HubError::PermissionDenied { .. })
        ));
    }
    assert_eq!(state_of(&h, session_id).await, SessionState::Active);
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::SessionEnded, AuditOutcome::Denied)));

    h.hub.request_end(session_id, "patient-1").await.unwrap();
    assert_eq!(state_of(&h, session_id).await, SessionState::Ended);
}

#[tokio::test]
async fn strangers_cannot_withdraw_a_request() {
    let h = harness().await;
    let session_id = h
        .hub
        .request_consultation("patient-1", "blurred vision")
        .await
        .unwrap();

    assert!(matches!(
        h.hub.request_end(session_id, "mallory-9").await,
        Err(HubError::PermissionDenied { .. })
    ));
    assert_eq!(state_of(&h, session_id).await, SessionState::Requested);
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::SessionCancelled, AuditOutcome::Denied)));
}

#[tokio::test]
async fn failed_transcript_write_still_tears_the_session_down() {
    let records = Arc::new(FlakyRecordStore::new());
    let h = harness_with(
        Arc::new(MemoryAuditStore::new()),
        records.clone(),
        HubConfig {
            acceptance_window_secs: 3600,
            end_grace_secs: 1,
            channel_capacity: 64,
        },
    )
    .await;
    let (session_id, _patient, _provider) = activate(&h).await;
    h.hub
        .submit_audio_chunk(session_id, "patient-1", silent(session_id, 0))
        .await
        .unwrap();

    records.set_failing(true);
    assert!(matches!(
        h.hub.request_end(session_id, "provider-1").await,
        Err(HubError::Persistence(_))
    ));

    // The end committed and cleanup ran despite the failed write.
    let session = h.hub.registry().get(session_id).unwrap();
    let guard = session.lock().await;
    assert_eq!(guard.state(), SessionState::Ended);
    assert_eq!(guard.live_channel_count(), 0);
}

#[tokio::test]
async fn transfer_rebinds_the_provider_with_paired_audit() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    h.hub
        .transfer_consultation(session_id, "provider-1", "provider-2")
        .await
        .unwrap();

    {
        let session = h.hub.registry().get(session_id).unwrap();
        let guard = session.lock().await;
        assert_eq!(guard.provider_id(), Some("provider-2"));
        assert_eq!(guard.state(), SessionState::Active);
    }

    // The outgoing provider lost their standing; the incoming one
    // picks the consultation up like any accepted session.
    assert!(matches!(
        h.hub.save_notes(session_id, "provider-1", "late note").await,
        Err(HubError::PermissionDenied { .. })
    ));
    let _provider2 = h
        .hub
        .attach(session_id, "provider-2", Role::Provider)
        .await
        .unwrap();
    h.hub
        .save_notes(session_id, "provider-2", "taking over care")
        .await
        .unwrap();

    let transfers = audit_actions(&h)
        .await
        .iter()
        .filter(|(a, _)| *a == AuditAction::ConsultationTransferred)
        .count();
    assert_eq!(transfers, 2);
}

#[tokio::test]
async fn transfer_requires_the_bound_provider() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    for actor in ["patient-1", "provider-2", "mallory-9"] {
        assert!(matches!(
            h.hub
                .transfer_consultation(session_id, actor, "provider-3")
                .await,
            Err(HubError::PermissionDenied { .. })
        ));
    }

    let session = h.hub.registry().get(session_id).unwrap();
    assert_eq!(session.lock().await.provider_id(), Some("provider-1"));
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::ConsultationTransferred, AuditOutcome::Denied)));
}

#[tokio::test]
async fn key_rotation_keeps_old_records_readable() {
    let h = harness().await;
    let (session_id, _patient, _provider) = activate(&h).await;

    h.hub.rotate_key("compliance-1").await.unwrap();
    h.hub
        .save_notes(session_id, "provider-1", "post-rotation note")
        .await
        .unwrap();

    let record = h.hub.load_record(session_id, "provider-1").await.unwrap();
    let by_name = |n: &str| record.iter().find(|(name, _)| name == n).unwrap().1.clone();
    // Symptoms were sealed under the old key version, notes under the new.
    assert_eq!(by_name("symptoms"), "persistent migraine, photophobia");
    assert_eq!(by_name("notes"), "post-rotation note");
    assert!(audit_actions(&h)
        .await
        .contains(&(AuditAction::KeyRotated, AuditOutcome::Success)));
}
