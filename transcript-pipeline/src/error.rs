use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("audio chunk {seq} is staler than the reorder window (next expected {next})")]
    SequenceWindowExceeded { seq: u64, next: u64 },

    #[error("pipeline is closed")]
    SessionClosed,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure from the recognition engine collaborator.
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Engine temporarily unreachable or overloaded; worth retrying.
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),

    /// Engine rejected the audio itself; retrying the same span is
    /// pointless.
    #[error("recognition engine rejected audio: {0}")]
    InvalidAudio(String),
}

impl RecognitionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
