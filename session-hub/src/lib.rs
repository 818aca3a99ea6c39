//! Consultation session orchestration hub for TeleCare Engine
//!
//! Owns the per-consultation state machine (`Requested → Accepted →
//! Active → Ended`, with `Cancelled` reachable from the first two),
//! the set of connected participant channels, and the routing between
//! participants, the transcription pipeline, the PHI vault, and the
//! audit chain:
//!
//! - Every state transition is audited *before* it commits; an audit
//!   write failure rolls the transition back and surfaces
//!   `HubError::AuditWriteFailure`
//! - Each session's operations are serialized behind its own mutex;
//!   different sessions proceed fully in parallel
//! - Audio flows hub → pipeline; transcript segments flow pipeline →
//!   hub → every attached channel, in sequence order
//! - Symptoms, clinical notes, and the assembled session transcript
//!   are encrypted field-by-field through `phi-vault` before they
//!   reach the persistence collaborator; plaintext PHI never touches
//!   storage or logs

pub mod channel;
pub mod config;
pub mod error;
pub mod hub;
pub mod persistence;
pub mod registry;
pub mod role;
pub mod session;
pub mod state;

pub use channel::{ChannelHandle, OutboundMessage};
pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use hub::SessionHub;
pub use persistence::{MemoryRecordStore, PersistenceError, RecordStore, StoredField};
pub use registry::SessionRegistry;
pub use role::Role;
pub use session::Session;
pub use state::{CancelReason, SessionState};
