use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::entry::{AuditEntry, AuditEvent};
use crate::error::AuditResult;
use crate::store::AuditStore;

/// Hex hash used as the predecessor of entry 0.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Result of walking a chain range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Valid,
    /// The first index at which the chain fails to verify.
    CorruptAt(u64),
}

struct Tail {
    next_index: u64,
    hash: String,
}

/// Append-only recorder maintaining the audit hash chain.
///
/// The tail mutex is the single cross-session serialization point:
/// appends from concurrent sessions interleave, but each one computes
/// its chain hash against a settled predecessor and only advances the
/// tail once the store acknowledges durability.
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    tail: Mutex<Tail>,
}

impl AuditRecorder {
    /// Build a recorder over a store, resuming the chain from the
    /// store's last entry if it already holds one.
    pub async fn new(store: Arc<dyn AuditStore>) -> AuditResult<Self> {
        let len = store.len().await?;
        let hash = if len == 0 {
            GENESIS_HASH.to_string()
        } else {
            store
                .load_range(len - 1, len)
                .await?
                .pop()
                .map(|e| e.hash)
                .unwrap_or_else(|| GENESIS_HASH.to_string())
        };

        Ok(Self {
            store,
            tail: Mutex::new(Tail {
                next_index: len,
                hash,
            }),
        })
    }

    /// Append an event to the chain.
    ///
    /// On storage failure the tail does not advance and the caller
    /// must treat the triggering action as not-yet-committed.
    pub async fn record(&self, event: AuditEvent) -> AuditResult<AuditEntry> {
        let mut tail = self.tail.lock().await;

        let mut entry = AuditEntry {
            index: tail.next_index,
            timestamp: Utc::now(),
            actor_id: event.actor_id,
            action: event.action,
            subject: event.subject,
            outcome: event.outcome,
            prev_hash: tail.hash.clone(),
            hash: String::new(),
        };
        entry.hash = chain_hash(&entry.prev_hash, &entry);

        if let Err(err) = self.store.append(entry.clone()).await {
            warn!(index = entry.index, error = %err, "audit append failed");
            return Err(err);
        }

        tail.next_index += 1;
        tail.hash = entry.hash.clone();

        debug!(
            index = entry.index,
            action = entry.action.as_str(),
            outcome = entry.outcome.as_str(),
            "audit entry recorded"
        );
        Ok(entry)
    }

    /// Read entries with `start <= index < end`.
    pub async fn trail(&self, start: u64, end: u64) -> AuditResult<Vec<AuditEntry>> {
        self.store.load_range(start, end).await
    }

    /// Number of entries recorded so far.
    pub async fn len(&self) -> AuditResult<u64> {
        self.store.len().await
    }

    /// Recompute hashes over `start..end` to detect tampering or gaps.
    pub async fn verify_chain(&self, start: u64, end: u64) -> AuditResult<ChainStatus> {
        let entries = self.store.load_range(start, end).await?;

        let mut expected_prev = if start == 0 {
            GENESIS_HASH.to_string()
        } else {
            match self.store.load_range(start - 1, start).await?.pop() {
                Some(prev) => prev.hash,
                // Predecessor missing: the chain is broken at `start`.
                None => return Ok(ChainStatus::CorruptAt(start)),
            }
        };

        let mut expected_index = start;
        for entry in &entries {
            if entry.index != expected_index
                || entry.prev_hash != expected_prev
                || entry.hash != chain_hash(&entry.prev_hash, entry)
            {
                return Ok(ChainStatus::CorruptAt(entry.index.min(expected_index)));
            }
            expected_prev = entry.hash.clone();
            expected_index += 1;
        }

        Ok(ChainStatus::Valid)
    }
}

/// SHA-256 over the predecessor hash plus the entry's canonical bytes.
fn chain_hash(prev_hash: &str, entry: &AuditEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(entry.canonical_bytes());
    hex::encode(hasher.finalize())
}
