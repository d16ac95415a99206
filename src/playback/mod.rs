//! Playback: inbound model audio → gapless scheduling → speaker.
//!
//! # Pipeline
//!
//! ```text
//! SessionEvent::AudioChunk (base64 PCM16 @ 24 kHz)
//!   → PlaybackBuffer::from_base64
//!   → PlaybackScheduler::schedule  (cursor, active set)
//!   → AudioOutput::start_source    (SpeakerOutput mixes into cpal)
//!   → SourceEndedSender            (natural completion back to the controller)
//! ```

pub mod output;
pub mod scheduler;

pub use output::{
    AudioOutput, SourceEndedReceiver, SourceEndedSender, SourceId, SpeakerOutput,
};
pub use scheduler::{PlaybackBuffer, PlaybackScheduler};

#[cfg(test)]
pub use output::{ManualOutput, StartedSource};
