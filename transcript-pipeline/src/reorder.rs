use std::collections::BTreeMap;

use tracing::warn;

use crate::chunk::AudioChunk;
use crate::error::{PipelineError, PipelineResult};

/// Chunks released by one [`ReorderBuffer::accept`] call.
#[derive(Debug, Default)]
pub struct Accepted {
    /// Chunks now deliverable in non-decreasing seq order.
    pub ready: Vec<AudioChunk>,
    /// Sequence numbers given up on to bound the buffer.
    pub skipped: u64,
}

/// Bounded reorder buffer for one session's audio stream.
///
/// Arrivals ahead of the next expected seq are parked until the gap
/// fills; arrivals behind it are rejected as stale. When the newest
/// pending chunk runs `window` seqs ahead, the buffer abandons the
/// oldest part of the gap rather than grow without bound.
pub struct ReorderBuffer {
    next_seq: u64,
    window: u64,
    pending: BTreeMap<u64, AudioChunk>,
}

impl ReorderBuffer {
    pub fn new(window: u64) -> Self {
        Self {
            next_seq: 0,
            window: window.max(1),
            pending: BTreeMap::new(),
        }
    }

    /// Next sequence number the buffer is waiting for.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Offer a chunk; returns the chunks that became deliverable.
    pub fn accept(&mut self, chunk: AudioChunk) -> PipelineResult<Accepted> {
        if chunk.seq < self.next_seq {
            return Err(PipelineError::SequenceWindowExceeded {
                seq: chunk.seq,
                next: self.next_seq,
            });
        }
        // A duplicate seq supersedes the buffered copy.
        self.pending.insert(chunk.seq, chunk);

        let mut out = Accepted::default();

        if let Some((&max_seq, _)) = self.pending.iter().next_back() {
            if max_seq - self.next_seq >= self.window {
                let new_next = max_seq - self.window + 1;
                let buffered_below: Vec<u64> =
                    self.pending.range(..new_next).map(|(&seq, _)| seq).collect();
                for seq in buffered_below {
                    if let Some(ready) = self.pending.remove(&seq) {
                        out.ready.push(ready);
                    }
                }
                out.skipped = (new_next - self.next_seq) - out.ready.len() as u64;
                if out.skipped > 0 {
                    warn!(
                        from = self.next_seq,
                        to = new_next,
                        skipped = out.skipped,
                        "reorder window exceeded, abandoning gap"
                    );
                }
                self.next_seq = new_next;
            }
        }

        while let Some(ready) = self.pending.remove(&self.next_seq) {
            out.ready.push(ready);
            self.next_seq += 1;
        }

        Ok(out)
    }

    /// Release everything still buffered, in order, for a final flush.
    pub fn drain(&mut self) -> Vec<AudioChunk> {
        let mut remaining: Vec<AudioChunk> = std::mem::take(&mut self.pending)
            .into_values()
            .collect();
        if let Some(last) = remaining.last() {
            self.next_seq = last.seq + 1;
        }
        remaining.sort_by_key(|c| c.seq);
        remaining
    }
}
