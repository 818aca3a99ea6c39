//! Field-level PHI encryption vault for TeleCare Engine
//!
//! Every patient health information value that reaches durable storage
//! goes through this crate first. The vault provides:
//!
//! - AES-256-GCM encryption of individual fields
//! - Context binding: the GCM tag covers the record id and field name,
//!   so a ciphertext lifted from one field cannot be replayed into
//!   another (`VaultError::Integrity` on mismatch)
//! - Bucket padding: plaintext is padded to fixed-size blocks before
//!   encryption so ciphertext length only reveals a coarse size class
//! - Versioned key ring with rotation; retired versions stay available
//!   for decryption up to a configured retention bound
//! - Zeroization of key material on drop
//!
//! # Example
//!
//! ```rust
//! use phi_vault::{CryptoVault, FieldContext, VaultConfig};
//!
//! # fn main() -> Result<(), phi_vault::VaultError> {
//! let vault = CryptoVault::generate(VaultConfig::default())?;
//! let ctx = FieldContext::new("consultation-42", "symptoms");
//!
//! let field = vault.encrypt("persistent migraine, photophobia", &ctx)?;
//! let plaintext = vault.decrypt(&field, &ctx)?;
//! assert_eq!(plaintext, "persistent migraine, photophobia");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod keyring;
pub mod vault;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use field::{EncryptedField, FieldContext};
pub use keyring::KeyRing;
pub use vault::CryptoVault;
