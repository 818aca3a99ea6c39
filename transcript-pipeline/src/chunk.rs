use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One session-scoped unit of raw audio.
///
/// Transient: consumed by the pipeline and never persisted. Payload is
/// 16-bit little-endian PCM at `sample_rate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub session_id: Uuid,
    /// Monotonically increasing per session.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub sample_rate: u32,
    pub payload: Vec<u8>,
}

impl AudioChunk {
    pub fn new(session_id: Uuid, seq: u64, sample_rate: u32, payload: Vec<u8>) -> Self {
        Self {
            session_id,
            seq,
            timestamp: Utc::now(),
            sample_rate,
            payload,
        }
    }

    /// Chunk duration derived from the sample count.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let samples = (self.payload.len() / 2) as u64;
        samples * 1000 / self.sample_rate as u64
    }

    /// Root-mean-square level normalized to 0.0..1.0, used by the
    /// silence heuristic.
    pub fn rms(&self) -> f32 {
        let samples: Vec<i16> = self
            .payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if samples.is_empty() {
            return 0.0;
        }

        let sum_sq: f64 = samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }
}
