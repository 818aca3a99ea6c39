use serde::{Deserialize, Serialize};

/// Vault configuration.
///
/// Loaded from environment variables with typed defaults; the master
/// key itself is supplied separately (see `CryptoVault::from_base64_key`)
/// so that configuration structs never carry key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// How many retired key versions remain decryptable after rotation.
    pub retained_key_versions: usize,
    /// Plaintext padding bucket size in bytes.
    pub pad_block_bytes: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            retained_key_versions: 8,
            pad_block_bytes: 64,
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let retained_key_versions = std::env::var("VAULT_RETAINED_KEY_VERSIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8);

        let pad_block_bytes = std::env::var("VAULT_PAD_BLOCK_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&b: &usize| b > 0)
            .unwrap_or(64);

        Self {
            retained_key_versions,
            pad_block_bytes,
        }
    }
}
