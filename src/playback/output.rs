//! Audio output: the clock playback is scheduled against, and the sink that
//! plays scheduled buffers.
//!
//! [`SpeakerOutput`] mixes every scheduled source into one cpal output
//! stream.  Its clock counts frames actually rendered by the callback, so
//! `current_time` never runs ahead of what the listener has heard.  When a
//! source plays out naturally its [`SourceId`] is sent on the
//! [`SourceEndedSender`] given at open time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::mpsc;

use super::scheduler::PlaybackBuffer;
use crate::audio::{resample, DeviceError};

/// Identifier of one scheduled playback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// Reports sources that finished playing on their own.
pub type SourceEndedSender = mpsc::UnboundedSender<SourceId>;

/// Receiving end of [`SourceEndedSender`].
pub type SourceEndedReceiver = mpsc::UnboundedReceiver<SourceId>;

// ---------------------------------------------------------------------------
// AudioOutput
// ---------------------------------------------------------------------------

/// An output device with a clock in seconds.
///
/// Only the playback scheduler starts and stops sources.
pub trait AudioOutput {
    /// Seconds of audio rendered since the output was opened.
    fn current_time(&self) -> f64;

    /// `false` once the output has been closed.  Nothing should be scheduled
    /// on a dead output.
    fn is_live(&self) -> bool;

    /// Play `buffer` starting at `when` on the output clock.
    fn start_source(&mut self, id: SourceId, buffer: PlaybackBuffer, when: f64);

    /// Cut `id` immediately.  Forced stops are not reported as ended.
    fn stop_source(&mut self, id: SourceId);

    /// Start rendering.  Outputs open suspended.
    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Stop rendering and drop every source.  Idempotent.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

struct Voice {
    id: SourceId,
    samples: Vec<f32>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// State shared between [`SpeakerOutput`] and its cpal callback.
struct Mixer {
    frames_rendered: u64,
    voices: Vec<Voice>,
    ended: SourceEndedSender,
    gain: f32,
}

impl Mixer {
    fn new(ended: SourceEndedSender, gain: f32) -> Self {
        Self {
            frames_rendered: 0,
            voices: Vec::new(),
            ended,
            gain,
        }
    }

    /// Queue a voice at `start_frame`.  If the render head has already passed
    /// it, the late prefix is dropped so the voice still ends where it was
    /// scheduled to.
    fn add_voice(&mut self, id: SourceId, mut samples: Vec<f32>, start_frame: u64) {
        let late = self.frames_rendered.saturating_sub(start_frame);
        if late > 0 {
            let skip = (late as usize).min(samples.len());
            samples.drain(..skip);
        }
        self.voices.push(Voice {
            id,
            samples,
            start_frame: start_frame.max(self.frames_rendered),
        });
    }

    /// Fill `out` (interleaved, `channels` wide) with the sum of all voices,
    /// then retire voices that have played out.
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let base = self.frames_rendered;
        let mut frames = 0u64;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let t = base + i as u64;
            let mixed: f32 = self
                .voices
                .iter()
                .filter(|v| t >= v.start_frame)
                .filter_map(|v| v.samples.get((t - v.start_frame) as usize))
                .sum();
            frame.fill((mixed * self.gain).clamp(-1.0, 1.0));
            frames += 1;
        }

        self.frames_rendered += frames;
        let now = self.frames_rendered;
        let ended = &self.ended;
        self.voices.retain(|voice| {
            let done = voice.end_frame() <= now;
            if done {
                let _ = ended.send(voice.id);
            }
            !done
        });
    }
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// SpeakerOutput
// ---------------------------------------------------------------------------

/// cpal-backed [`AudioOutput`].
pub struct SpeakerOutput {
    stream: Option<cpal::Stream>,
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
}

impl SpeakerOutput {
    /// Build an output stream on `device`, suspended until [`resume`].
    ///
    /// [`resume`]: AudioOutput::resume
    pub fn open(
        device: &cpal::Device,
        ended: SourceEndedSender,
        gain: f32,
    ) -> Result<Self, DeviceError> {
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels() as usize;
        let device_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let mixer = Arc::new(Mutex::new(Mixer::new(ended, gain)));
        let err_fn = |err: cpal::StreamError| log::error!("playback: stream error: {err}");

        let stream = match sample_format {
            SampleFormat::F32 => {
                let mixer = Arc::clone(&mixer);
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        lock(&mixer).render(data, channels);
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let mixer = Arc::clone(&mixer);
                let mut scratch: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        lock(&mixer).render(&mut scratch, channels);
                        for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                            *out = (s * 32767.0) as i16;
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        };

        if let Err(e) = stream.pause() {
            log::debug!("playback: could not suspend new stream: {e}");
        }

        log::info!(
            "playback: opened {} ({device_rate} Hz, {channels} ch, {sample_format:?})",
            device.name().unwrap_or_else(|_| "unknown device".into())
        );

        Ok(Self {
            stream: Some(stream),
            mixer,
            device_rate,
        })
    }
}

impl AudioOutput for SpeakerOutput {
    fn current_time(&self) -> f64 {
        lock(&self.mixer).frames_rendered as f64 / f64::from(self.device_rate)
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    fn start_source(&mut self, id: SourceId, buffer: PlaybackBuffer, when: f64) {
        let samples = resample(&buffer.samples, buffer.sample_rate, self.device_rate);
        let requested = (when * f64::from(self.device_rate)).round() as u64;

        lock(&self.mixer).add_voice(id, samples, requested);
    }

    fn stop_source(&mut self, id: SourceId) {
        lock(&self.mixer).voices.retain(|voice| voice.id != id);
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        let stream = self.stream.as_ref().ok_or(DeviceError::Released)?;
        stream.play()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("playback: pause on close failed: {e}");
            }
            drop(stream);
            log::info!("playback: output closed");
        }
        lock(&self.mixer).voices.clear();
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// ManualOutput (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use manual::{ManualOutput, StartedSource};


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
