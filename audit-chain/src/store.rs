use async_trait::async_trait;
use parking_lot::RwLock;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

/// Narrow storage boundary for the audit log.
///
/// The engine never issues queries against audit storage directly;
/// durable backends implement this trait at the persistence
/// collaborator's side.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry. Must be durable before returning Ok; a failure
    /// here means the triggering action is treated as uncommitted.
    async fn append(&self, entry: AuditEntry) -> AuditResult<()>;

    /// Load entries with `start <= index < end`.
    async fn load_range(&self, start: u64, end: u64) -> AuditResult<Vec<AuditEntry>>;

    /// Number of entries stored.
    async fn len(&self) -> AuditResult<u64>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a stored entry in place. Exists so integrity tests and
    /// compliance drills can simulate tampering; nothing in the engine
    /// calls this.
    pub fn tamper(&self, index: u64, mutate: impl FnOnce(&mut AuditEntry)) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(index as usize) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let mut entries = self.entries.write();
        if entry.index != entries.len() as u64 {
            return Err(AuditError::StorageUnavailable(format!(
                "append at index {} but log length is {}",
                entry.index,
                entries.len()
            )));
        }
        entries.push(entry);
        Ok(())
    }

    async fn load_range(&self, start: u64, end: u64) -> AuditResult<Vec<AuditEntry>> {
        if start > end {
            return Err(AuditError::InvalidRange { start, end });
        }
        let entries = self.entries.read();
        let start = (start as usize).min(entries.len());
        let end = (end as usize).min(entries.len());
        Ok(entries[start..end].to_vec())
    }

    async fn len(&self) -> AuditResult<u64> {
        Ok(self.entries.read().len() as u64)
    }
}
