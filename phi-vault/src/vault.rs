use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use rand::RngCore;
use tracing::{debug, info};

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::field::{EncryptedField, FieldContext};
use crate::keyring::KeyRing;

/// Field-level encryption vault for PHI.
///
/// Shared across all sessions; `encrypt`/`decrypt` take `&self` and
/// read the key ring through a lock snapshot, so rotation never tears
/// an in-flight operation.
pub struct CryptoVault {
    ring: RwLock<KeyRing>,
    config: VaultConfig,
}

impl CryptoVault {
    /// Create a vault around an existing 32-byte master key.
    pub fn new(key: [u8; 32], config: VaultConfig) -> Self {
        Self {
            ring: RwLock::new(KeyRing::new(key, config.retained_key_versions)),
            config,
        }
    }

    /// Create a vault from a base64-encoded master key, as delivered by
    /// the deployment's secret store.
    pub fn from_base64_key(key_b64: &str, config: VaultConfig) -> VaultResult<Self> {
        let key_bytes = BASE64.decode(key_b64).map_err(|_| VaultError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(VaultError::InvalidKeyLength {
                expected: 32,
                got: key_bytes.len(),
            });
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self::new(key, config))
    }

    /// Create a vault with a freshly generated random key.
    pub fn generate(config: VaultConfig) -> VaultResult<Self> {
        Ok(Self::new(KeyRing::random_key(), config))
    }

    /// Encrypt a PHI value, binding it to the supplied context.
    ///
    /// Always uses the current active key version. The plaintext is
    /// padded to `pad_block_bytes` buckets first, so the stored
    /// ciphertext length only reveals a coarse size class.
    pub fn encrypt(&self, plaintext: &str, context: &FieldContext) -> VaultResult<EncryptedField> {
        let ring = self.ring.read();
        let version = ring.active_version();
        let cipher = Self::cipher_for(ring.active_key()?)?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let padded = self.pad(plaintext.as_bytes());
        let aad = context.canonical_bytes();

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &padded,
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::InvalidKey)?;

        debug!(
            field = %context.field_name,
            key_version = version,
            ciphertext_len = ciphertext.len(),
            "encrypted PHI field"
        );

        Ok(EncryptedField {
            key_version: version,
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(&ciphertext),
        })
    }

    /// Decrypt a PHI value previously produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with `Integrity` when the authentication tag does not
    /// verify against the supplied context (wrong context, corruption,
    /// or tampering) and with `KeyUnavailable` when the field's key
    /// version has been purged from the ring.
    pub fn decrypt(&self, field: &EncryptedField, context: &FieldContext) -> VaultResult<String> {
        let ring = self.ring.read();
        let cipher = Self::cipher_for(ring.key_for(field.key_version)?)?;

        let nonce_bytes = BASE64
            .decode(&field.nonce)
            .map_err(|_| VaultError::InvalidFormat)?;
        if nonce_bytes.len() != 12 {
            return Err(VaultError::InvalidFormat);
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = BASE64
            .decode(&field.ciphertext)
            .map_err(|_| VaultError::InvalidFormat)?;

        let aad = context.canonical_bytes();
        let padded = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext.as_ref(),
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::Integrity {
                field: context.field_name.clone(),
            })?;

        let plaintext = Self::unpad(&padded)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::InvalidUtf8)
    }

    /// Generate new active key material.
    ///
    /// Prior versions stay decrypt-only until the retention bound
    /// pushes them out. Re-encryption of existing data is a separate
    /// maintenance operation, never done here.
    pub fn rotate_key(&self) -> u32 {
        let mut ring = self.ring.write();
        let version = ring.rotate();
        info!(key_version = version, retained = ring.retained(), "rotated vault key");
        version
    }

    /// Version new encryptions currently use.
    pub fn active_version(&self) -> u32 {
        self.ring.read().active_version()
    }

    fn cipher_for(key: &[u8; 32]) -> VaultResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::InvalidKey)
    }

    /// Length-prefix and zero-pad to the next bucket boundary.
    fn pad(&self, plaintext: &[u8]) -> Vec<u8> {
        let block = self.config.pad_block_bytes.max(1);
        let body = 4 + plaintext.len();
        let padded_len = body.div_ceil(block) * block;

        let mut out = Vec::with_capacity(padded_len);
        out.extend_from_slice(&(plaintext.len() as u32).to_le_bytes());
        out.extend_from_slice(plaintext);
        out.resize(padded_len, 0);
        out
    }

    fn unpad(padded: &[u8]) -> VaultResult<Vec<u8>> {
        if padded.len() < 4 {
            return Err(VaultError::InvalidFormat);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&padded[..4]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        padded
            .get(4..4 + len)
            .map(|p| p.to_vec())
            .ok_or(VaultError::InvalidFormat)
    }
}
