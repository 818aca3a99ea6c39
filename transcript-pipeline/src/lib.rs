//! Streaming speech-to-text pipeline for TeleCare Engine
//!
//! Ingests ordered audio chunks for one consultation session and
//! produces partial and final transcript segments:
//!
//! - Out-of-order chunks are buffered in a bounded reorder window;
//!   chunks staler than the window are dropped and reported so the hub
//!   can audit the loss
//! - Partial segments are emitted as audio accumulates; a final
//!   segment closes the current span when the silence heuristic fires
//!   or the span reaches its configured length bound
//! - Final segments are authoritative: per session their sequence
//!   numbers are strictly increasing and they are never revised
//! - The recognition engine is an untrusted collaborator behind an
//!   async trait; failures are retried with bounded backoff and
//!   exhaustion yields a final flagged `degraded` rather than a
//!   session failure

pub mod chunk;
pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod recognizer;
pub mod reorder;
pub mod segment;

pub use chunk::AudioChunk;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, RecognitionError};
pub use pipeline::SessionPipeline;
pub use recognizer::{AudioSpan, RecognitionEngine};
pub use segment::{SegmentKind, TranscriptSegment};
