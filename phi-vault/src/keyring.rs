use std::collections::HashMap;

use aes_gcm::aead::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

/// A single AES-256 key, zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SecretKey(pub(crate) [u8; 32]);

/// Versioned key material: one active encryption key plus a bounded
/// history of retired versions kept for decrypt-only use.
///
/// Mutated only through [`KeyRing::rotate`]; the vault wraps the ring
/// in a `parking_lot::RwLock` so readers always see a whole pre- or
/// post-rotation snapshot.
pub struct KeyRing {
    active_version: u32,
    keys: HashMap<u32, SecretKey>,
    retained_versions: usize,
}

impl KeyRing {
    /// Create a ring with the given initial key as version 1.
    pub fn new(key: [u8; 32], retained_versions: usize) -> Self {
        let mut keys = HashMap::new();
        keys.insert(1, SecretKey(key));
        Self {
            active_version: 1,
            keys,
            retained_versions: retained_versions.max(1),
        }
    }

    /// Create a ring with a freshly generated random key.
    pub fn generate(retained_versions: usize) -> Self {
        Self::new(Self::random_key(), retained_versions)
    }

    pub(crate) fn random_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Version encryption currently uses.
    pub fn active_version(&self) -> u32 {
        self.active_version
    }

    pub(crate) fn active_key(&self) -> VaultResult<&[u8; 32]> {
        self.key_for(self.active_version)
    }

    pub(crate) fn key_for(&self, version: u32) -> VaultResult<&[u8; 32]> {
        self.keys
            .get(&version)
            .map(|k| &k.0)
            .ok_or(VaultError::KeyUnavailable { version })
    }

    /// Generate a new active key, retiring the previous one.
    ///
    /// Versions older than the retention bound are purged; fields
    /// encrypted under a purged version fail to decrypt with
    /// `KeyUnavailable`. Existing data is never re-encrypted here.
    pub fn rotate(&mut self) -> u32 {
        self.active_version += 1;
        self.keys
            .insert(self.active_version, SecretKey(Self::random_key()));

        while self.keys.len() > self.retained_versions {
            if let Some(&oldest) = self.keys.keys().min() {
                self.keys.remove(&oldest);
            }
        }

        self.active_version
    }

    /// Number of versions currently decryptable.
    pub fn retained(&self) -> usize {
        self.keys.len()
    }
}
