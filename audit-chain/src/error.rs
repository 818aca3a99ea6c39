use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid audit range: start {start} past end {end}")]
    InvalidRange { start: u64, end: u64 },
}

pub type AuditResult<T> = Result<T, AuditError>;
