//! Tamper-evident audit trail for TeleCare Engine
//!
//! Every sensitive action in the engine (session state transitions,
//! PHI reads and writes, dropped audio, degraded recognition) is
//! appended here as an immutable [`AuditEntry`]. Each entry carries a
//! SHA-256 hash chained over the previous entry's hash plus the
//! entry's canonical encoding, so retroactive tampering or gaps are
//! detectable by [`AuditRecorder::verify_chain`].
//!
//! The append path is the single serialization point for the chain
//! across all sessions: appends from different sessions interleave,
//! but each one is atomic with respect to the previous hash.
//!
//! Storage sits behind the narrow [`AuditStore`] trait; the in-memory
//! implementation here is used by tests and single-process
//! deployments, while durable backends live with the persistence
//! collaborator.

pub mod entry;
pub mod error;
pub mod recorder;
pub mod store;

pub use entry::{AuditAction, AuditEntry, AuditEvent, AuditOutcome};
pub use error::{AuditError, AuditResult};
pub use recorder::{AuditRecorder, ChainStatus};
pub use store::{AuditStore, MemoryAuditStore};
