use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use phi_vault::EncryptedField;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("record storage unavailable: {0}")]
    Unavailable(String),
}

/// One named encrypted field of a consultation record.
///
/// The record never stores plaintext PHI: every sensitive value is an
/// [`EncryptedField`] produced by the vault; non-sensitive metadata
/// (timestamps, state, participant ids) lives with the collaborator's
/// own schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredField {
    pub name: String,
    pub field: EncryptedField,
}

/// Persistence collaborator boundary.
///
/// The core never issues queries; these two operations (plus the audit
/// store's equivalents) are the whole storage surface.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upsert fields of the consultation record keyed by session id.
    /// Fields already present under the same name are replaced.
    async fn save_encrypted_record(
        &self,
        session_id: Uuid,
        fields: Vec<StoredField>,
    ) -> Result<(), PersistenceError>;

    async fn load_encrypted_record(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<StoredField>, PersistenceError>;
}

/// In-memory record store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<Uuid, Vec<StoredField>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save_encrypted_record(
        &self,
        session_id: Uuid,
        fields: Vec<StoredField>,
    ) -> Result<(), PersistenceError> {
        let mut records = self.records.write();
        let record = records.entry(session_id).or_default();
        for incoming in fields {
            match record.iter_mut().find(|f| f.name == incoming.name) {
                Some(existing) => *existing = incoming,
                None => record.push(incoming),
            }
        }
        Ok(())
    }

    async fn load_encrypted_record(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<StoredField>, PersistenceError> {
        Ok(self
            .records
            .read()
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}
