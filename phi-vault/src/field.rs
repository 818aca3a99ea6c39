use serde::{Deserialize, Serialize};

/// An encrypted PHI value as stored in place of the plaintext.
///
/// The GCM authentication tag is embedded at the end of the ciphertext;
/// it covers both the ciphertext and the canonical bytes of the
/// [`FieldContext`] the value was encrypted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    /// Version of the key this field was encrypted with.
    pub key_version: u32,
    /// Base64-encoded 96-bit nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext with the authentication tag appended.
    pub ciphertext: String,
}

/// Binding context for a field: which record and which field within it.
///
/// Fed to AES-GCM as associated data, so decrypting a field under the
/// wrong record id or field name fails the integrity check. This is
/// what prevents a ciphertext stored as one patient's `notes` from
/// being substituted into another record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldContext {
    pub record_id: String,
    pub field_name: String,
}

impl FieldContext {
    pub fn new(record_id: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            field_name: field_name.into(),
        }
    }

    /// Canonical byte encoding used as GCM associated data.
    ///
    /// The record id length prefix keeps `("ab", "c")` and `("a", "bc")`
    /// from encoding identically.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.record_id.len() + self.field_name.len());
        out.extend_from_slice(&(self.record_id.len() as u64).to_le_bytes());
        out.extend_from_slice(self.record_id.as_bytes());
        out.extend_from_slice(self.field_name.as_bytes());
        out
    }
}
