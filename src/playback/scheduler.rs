//! Gapless playback scheduling with barge-in.
//!
//! [`PlaybackScheduler`] keeps a cursor (`next_start_time`) on the output
//! clock and the set of sources still playing.  Each inbound chunk is
//! scheduled at the cursor and the cursor advances by the chunk's duration,
//! so chunks that arrive faster than they play are concatenated with no gap.
//!
//! ```text
//!   clock  0.0        0.5     0.8   1.0
//!          |--chunk 1--|-chunk 2-|-c3-|
//!          ^ cursor starts here; each schedule moves it to the chunk's end
//! ```
//!
//! If the cursor falls behind the clock (a stall), it snaps forward to "now";
//! audio is never scheduled in the past.  An interruption stops everything
//! and resets the cursor to zero so the next chunk plays immediately.

use std::collections::HashSet;

use super::output::{AudioOutput, SourceId};
use crate::audio::{decode_base64, decode_pcm16, DecodeError, PLAYBACK_WIRE_RATE};

// ---------------------------------------------------------------------------
// PlaybackBuffer
// ---------------------------------------------------------------------------

/// Decoded mono audio ready to schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode an inbound chunk: base64 PCM16 at the playback wire rate.
    pub fn from_base64(data: &str) -> Result<Self, DecodeError> {
        let bytes = decode_base64(data)?;
        Ok(Self::new(decode_pcm16(&bytes), PLAYBACK_WIRE_RATE))
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Places inbound chunks back-to-back on the output clock and tracks which
/// of them are still playing.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    active: HashSet<SourceId>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `buffer` on `output` right after everything already queued.
    ///
    /// Returns the new source and its start time, or `None` when the output
    /// is closed or the buffer holds no samples.
    pub fn schedule(
        &mut self,
        output: &mut dyn AudioOutput,
        buffer: PlaybackBuffer,
    ) -> Option<(SourceId, f64)> {
        if !output.is_live() {
            log::debug!("playback: output closed, chunk discarded");
            return None;
        }
        if buffer.is_empty() {
            return None;
        }

        let now = output.current_time();
        if self.next_start_time < now {
            self.next_start_time = now;
        }

        let when = self.next_start_time;
        let id = SourceId(self.next_id);
        self.next_id += 1;
        self.next_start_time += buffer.duration();

        output.start_source(id, buffer, when);
        self.active.insert(id);
        log::trace!("playback: source {} at {when:.3}s", id.0);
        Some((id, when))
    }

    /// A source played out.  Returns `true` if it was still tracked.
    pub fn source_ended(&mut self, id: SourceId) -> bool {
        self.active.remove(&id)
    }

    /// Cut every active source and reset the cursor.
    pub fn stop_all(&mut self, output: &mut dyn AudioOutput) {
        for id in self.active.drain() {
            output.stop_source(id);
        }
        self.next_start_time = 0.0;
    }

    /// Forget all sources and reset the cursor without touching the output.
    pub fn reset(&mut self) {
        self.active.clear();
        self.next_start_time = 0.0;
    }

    /// True while any scheduled source has not yet ended.
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Output-clock time, in seconds, where the next chunk will start.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
