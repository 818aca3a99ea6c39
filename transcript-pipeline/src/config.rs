use serde::{Deserialize, Serialize};

/// Pipeline tuning knobs, env-loaded with fixed defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How many sequence numbers ahead of the next expected chunk the
    /// reorder buffer will hold before skipping the gap.
    pub reorder_window: u64,
    /// Recognition retry attempts after the first failure.
    pub max_retries: u32,
    /// Base backoff between recognition retries; doubles per attempt.
    pub retry_backoff_ms: u64,
    /// RMS level (0.0..1.0) below which a chunk counts as silence and
    /// closes the current span.
    pub silence_threshold: f32,
    /// Force a final segment once a span reaches this many chunks.
    pub max_span_chunks: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reorder_window: 32,
            max_retries: 3,
            retry_backoff_ms: 200,
            silence_threshold: 0.015,
            max_span_chunks: 8,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            reorder_window: env_parse("PIPELINE_REORDER_WINDOW", defaults.reorder_window),
            max_retries: env_parse("PIPELINE_MAX_RETRIES", defaults.max_retries),
            retry_backoff_ms: env_parse("PIPELINE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            silence_threshold: env_parse("PIPELINE_SILENCE_THRESHOLD", defaults.silence_threshold),
            max_span_chunks: env_parse("PIPELINE_MAX_SPAN_CHUNKS", defaults.max_span_chunks),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
