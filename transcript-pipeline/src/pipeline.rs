use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::AudioChunk;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::filter::clean_transcript;
use crate::recognizer::{AudioSpan, RecognitionEngine};
use crate::reorder::ReorderBuffer;
use crate::segment::{SegmentKind, TranscriptSegment};

/// Segments produced by one ingest call, plus any gap the reorder
/// buffer had to abandon (the hub audits non-zero skips).
#[derive(Debug, Default)]
pub struct IngestOutput {
    pub segments: Vec<TranscriptSegment>,
    pub skipped: u64,
}

/// Per-session streaming transcription state.
///
/// Owned by the session (behind its mutex), so all calls for one
/// session are already serialized; different sessions run their
/// pipelines fully in parallel.
pub struct SessionPipeline {
    session_id: Uuid,
    config: PipelineConfig,
    engine: Arc<dyn RecognitionEngine>,
    reorder: ReorderBuffer,
    span_chunks: Vec<AudioChunk>,
    span_start_ms: u64,
    clock_ms: u64,
    closed: bool,
}

impl SessionPipeline {
    pub fn new(session_id: Uuid, config: PipelineConfig, engine: Arc<dyn RecognitionEngine>) -> Self {
        let reorder = ReorderBuffer::new(config.reorder_window);
        Self {
            session_id,
            config,
            engine,
            reorder,
            span_chunks: Vec::new(),
            span_start_ms: 0,
            clock_ms: 0,
            closed: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Feed one audio chunk; returns the partial/final segments it
    /// unlocked.
    ///
    /// Chunks staler than the reorder window are rejected with
    /// `SequenceWindowExceeded`; the caller drops them and audits the
    /// loss. Recognition trouble never surfaces as an error here;
    /// at worst the span's final comes back flagged `degraded`.
    pub async fn ingest(&mut self, chunk: AudioChunk) -> PipelineResult<IngestOutput> {
        if self.closed {
            return Err(PipelineError::SessionClosed);
        }

        let accepted = self.reorder.accept(chunk)?;
        let mut out = IngestOutput {
            skipped: accepted.skipped,
            ..IngestOutput::default()
        };

        for ready in accepted.ready {
            let is_silence = ready.rms() < self.config.silence_threshold;

            self.clock_ms += ready.duration_ms();
            self.span_chunks.push(ready);

            if is_silence || self.span_chunks.len() >= self.config.max_span_chunks {
                if let Some(segment) = self.finalize_span().await {
                    out.segments.push(segment);
                }
            } else if let Some(segment) = self.partial_for_span().await {
                out.segments.push(segment);
            }
        }

        Ok(out)
    }

    /// Finalize whatever audio is still buffered and close the
    /// pipeline. Called when the session ends; later ingests fail with
    /// `SessionClosed`.
    pub async fn flush(&mut self) -> Vec<TranscriptSegment> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;

        for remaining in self.reorder.drain() {
            self.clock_ms += remaining.duration_ms();
            self.span_chunks.push(remaining);
        }

        match self.finalize_span().await {
            Some(segment) => vec![segment],
            None => Vec::new(),
        }
    }

    /// Best-effort provisional segment over the open span. A single
    /// recognition attempt; failures just mean no partial this chunk.
    async fn partial_for_span(&self) -> Option<TranscriptSegment> {
        let span = AudioSpan::from_chunks(&self.span_chunks, self.span_start_ms)?;

        let text = match self.engine.recognize(&span).await {
            Ok(raw) => clean_transcript(&raw)?,
            Err(err) => {
                debug!(session_id = %self.session_id, error = %err, "partial recognition skipped");
                return None;
            }
        };

        Some(TranscriptSegment {
            session_id: self.session_id,
            seq: span.end_seq,
            text,
            kind: SegmentKind::Partial,
            start_ms: span.start_ms,
            end_ms: span.end_ms,
            degraded: false,
        })
    }

    /// Close the open span with an authoritative final segment.
    async fn finalize_span(&mut self) -> Option<TranscriptSegment> {
        let chunks = std::mem::take(&mut self.span_chunks);
        let span = AudioSpan::from_chunks(&chunks, self.span_start_ms)?;
        self.span_start_ms = self.clock_ms;

        let (text, degraded) = self.recognize_with_retry(&span).await;

        Some(TranscriptSegment {
            session_id: self.session_id,
            seq: span.end_seq,
            text,
            kind: SegmentKind::Final,
            start_ms: span.start_ms,
            end_ms: span.end_ms,
            degraded,
        })
    }

    /// Bounded-retry recognition with exponential backoff. Exhaustion
    /// degrades the segment instead of failing the session.
    async fn recognize_with_retry(&self, span: &AudioSpan) -> (String, bool) {
        let attempts = self.config.max_retries + 1;

        for attempt in 0..attempts {
            match self.engine.recognize(span).await {
                Ok(raw) => {
                    return (clean_transcript(&raw).unwrap_or_default(), false);
                }
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    let backoff = self.config.retry_backoff_ms << attempt;
                    debug!(
                        session_id = %self.session_id,
                        start_seq = span.start_seq,
                        attempt,
                        backoff_ms = backoff,
                        "recognition failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(err) => {
                    warn!(
                        session_id = %self.session_id,
                        start_seq = span.start_seq,
                        end_seq = span.end_seq,
                        error = %err,
                        "recognition exhausted, emitting degraded final"
                    );
                    return (String::new(), true);
                }
            }
        }

        (String::new(), true)
    }
}
