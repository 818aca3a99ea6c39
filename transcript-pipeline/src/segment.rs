use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a segment is provisional or authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// May be superseded by a later segment with the same seq.
    Partial,
    /// Immutable; per session final seqs are strictly increasing.
    Final,
}

/// Transcript output for a span of session audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub session_id: Uuid,
    /// Derived from the input chunk ordering; a final's seq is the
    /// last chunk of its span.
    pub seq: u64,
    pub text: String,
    pub kind: SegmentKind,
    /// Offsets from the start of the session's audio stream.
    pub start_ms: u64,
    pub end_ms: u64,
    /// Set when recognition retries were exhausted for this span and
    /// the text is incomplete or empty.
    pub degraded: bool,
}

impl TranscriptSegment {
    pub fn is_final(&self) -> bool {
        self.kind == SegmentKind::Final
    }
}
