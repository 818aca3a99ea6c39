use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("integrity check failed for field '{field}'")]
    Integrity { field: String },

    #[error("key version {version} is no longer retained")]
    KeyUnavailable { version: u32 },

    #[error("invalid key material")]
    InvalidKey,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid encrypted field format")]
    InvalidFormat,

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

pub type VaultResult<T> = Result<T, VaultError>;
