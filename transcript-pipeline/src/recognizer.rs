use async_trait::async_trait;
use uuid::Uuid;

use crate::chunk::AudioChunk;
use crate::error::RecognitionError;

/// A contiguous run of session audio handed to the recognition engine.
#[derive(Debug, Clone)]
pub struct AudioSpan {
    pub session_id: Uuid,
    pub start_seq: u64,
    pub end_seq: u64,
    pub start_ms: u64,
    pub end_ms: u64,
    pub sample_rate: u32,
    /// Concatenated 16-bit little-endian PCM.
    pub payload: Vec<u8>,
}

impl AudioSpan {
    /// Build a span from the ordered chunks of one utterance.
    ///
    /// Returns None for an empty chunk list; callers never recognize
    /// zero audio.
    pub fn from_chunks(chunks: &[AudioChunk], start_ms: u64) -> Option<Self> {
        let first = chunks.first()?;
        let last = chunks.last()?;

        let total_ms: u64 = chunks.iter().map(AudioChunk::duration_ms).sum();
        let payload = chunks
            .iter()
            .flat_map(|c| c.payload.iter().copied())
            .collect();

        Some(Self {
            session_id: first.session_id,
            start_seq: first.seq,
            end_seq: last.seq,
            start_ms,
            end_ms: start_ms + total_ms,
            sample_rate: first.sample_rate,
            payload,
        })
    }
}

/// Speech recognition collaborator boundary.
///
/// Treated as an untrusted, possibly slow or fallible black box; the
/// pipeline owns all retry and degradation policy.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn recognize(&self, span: &AudioSpan) -> Result<String, RecognitionError>;
}
