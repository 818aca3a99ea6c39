//! Recognition output hygiene.
//!
//! Streaming speech models hallucinate filler phrases on silence and
//! near-silence spans; these filters keep that noise out of the
//! clinical transcript.

/// Phrases recognition engines emit on empty or noisy audio.
const HALLUCINATION_BLACKLIST: &[&str] = &[
    "you",
    "thank you",
    "thanks",
    "watching",
    "subscribe",
    "subtitle by",
    ".",
];

/// Clean one recognition result; None means nothing worth emitting.
pub fn clean_transcript(raw: &str) -> Option<String> {
    let text = raw.trim();

    if text.len() < 2 {
        return None;
    }
    if HALLUCINATION_BLACKLIST.contains(&text.to_lowercase().as_str()) {
        return None;
    }

    Some(text.to_string())
}
