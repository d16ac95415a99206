//! Microphone capture via `cpal`.
//!
//! Capture is split in two steps:
//!
//! 1. **Acquire**: [`MicrophoneInput::open`] builds the cpal input stream in
//!    a paused state.  Permission and availability problems surface here.
//! 2. **Start**: [`CapturePath::start`] installs the per-frame callback and
//!    plays the stream.
//!
//! Every callback runs on the cpal audio thread:
//!
//! ```text
//! cpal buffer → stereo_to_mono → FrameAssembler (fixed block)
//!             → FrameProcessor: rms → VolumeMeter
//!                               resample → 16 kHz → EncodedPacket → PacketSender
//! ```
//!
//! Nothing on that path waits for the network; packets go onto an unbounded
//! channel and the callback returns.

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleFormat;
use thiserror::Error;

use super::codec::{EncodedPacket, CAPTURE_WIRE_RATE};
use super::level::{rms, VolumeMeter};
use super::resample::{resample, stereo_to_mono};
use crate::live::PacketSender;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors from opening or driving an audio device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio device found on the default audio host")]
    NoDevice,

    #[error("audio device not found: {0}")]
    NotFound(String),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to pause audio stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("audio device already released")]
    Released,
}

// ---------------------------------------------------------------------------
// InputDevice
// ---------------------------------------------------------------------------

/// Callback receiving mono float samples at the device's native rate.
pub type FrameSink = Box<dyn FnMut(&[f32]) + Send>;

/// An acquired microphone.
///
/// `start` begins delivering mono samples to `sink`; `stop` releases the
/// device.  After `stop` the device cannot be restarted.
pub trait InputDevice {
    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    fn start(&mut self, sink: FrameSink) -> Result<(), DeviceError>;

    /// Release the device.  Safe to call more than once.
    fn stop(&mut self);
}

type SinkSlot = Arc<Mutex<Option<FrameSink>>>;

fn deliver(slot: &Mutex<Option<FrameSink>>, samples: &[f32]) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(sink) = guard.as_mut() {
        sink(samples);
    }
}

// ---------------------------------------------------------------------------
// MicrophoneInput
// ---------------------------------------------------------------------------

/// cpal-backed [`InputDevice`].
pub struct MicrophoneInput {
    stream: Option<cpal::Stream>,
    sink: SinkSlot,
    sample_rate: u32,
}

impl MicrophoneInput {
    /// Acquire `device` and build its input stream without starting it.
    ///
    /// Uses the device's default configuration.  Multi-channel input is
    /// downmixed to mono inside the callback; `i16` samples are scaled by
    /// 1/32768.
    pub fn open(device: &cpal::Device) -> Result<Self, DeviceError> {
        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let sink: SinkSlot = Arc::new(Mutex::new(None));
        let err_fn = |err: cpal::StreamError| log::error!("capture: stream error: {err}");

        let stream = match sample_format {
            SampleFormat::F32 => {
                let slot = Arc::clone(&sink);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        deliver(&slot, &stereo_to_mono(data, channels));
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let slot = Arc::clone(&sink);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> =
                            data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                        deliver(&slot, &stereo_to_mono(&floats, channels));
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        };

        // Some hosts start streams as soon as they are built.
        if let Err(e) = stream.pause() {
            log::debug!("capture: could not pause new stream: {e}");
        }

        log::info!(
            "capture: acquired {} ({sample_rate} Hz, {channels} ch, {sample_format:?})",
            device.name().unwrap_or_else(|_| "unknown device".into())
        );

        Ok(Self {
            stream: Some(stream),
            sink,
            sample_rate,
        })
    }
}

impl InputDevice for MicrophoneInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, sink: FrameSink) -> Result<(), DeviceError> {
        let stream = self.stream.as_ref().ok_or(DeviceError::Released)?;
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        if let Err(e) = stream.play() {
            self.sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return Err(e.into());
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("capture: pause on release failed: {e}");
            }
            drop(stream);
            log::info!("capture: microphone released");
        }
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Re-blocks arbitrary host buffer sizes into fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    block: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// A `block` of zero is treated as one.
    pub fn new(block: usize) -> Self {
        let block = block.max(1);
        Self {
            block,
            pending: Vec::with_capacity(block),
        }
    }

    /// Append `samples`, calling `emit` once per completed frame.  Leftover
    /// samples wait for the next push.
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let take = (self.block - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.block {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// FrameProcessor
// ---------------------------------------------------------------------------

/// Per-frame work: publish volume, convert to the wire format, send.
pub struct FrameProcessor {
    native_rate: u32,
    volume: VolumeMeter,
    packets: PacketSender,
}

impl FrameProcessor {
    pub fn new(native_rate: u32, volume: VolumeMeter, packets: PacketSender) -> Self {
        Self {
            native_rate,
            volume,
            packets,
        }
    }

    pub fn process(&self, frame: &[f32]) {
        self.volume.set(rms(frame));

        let wire = resample(frame, self.native_rate, CAPTURE_WIRE_RATE);
        if !self.packets.send(EncodedPacket::from_samples(&wire)) {
            log::trace!("capture: transport gone, packet dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// CapturePath
// ---------------------------------------------------------------------------

/// Owns an acquired [`InputDevice`] and wires it to a [`FrameProcessor`].
pub struct CapturePath {
    device: Box<dyn InputDevice>,
    running: bool,
}

impl CapturePath {
    pub fn new(device: Box<dyn InputDevice>) -> Self {
        Self {
            device,
            running: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.device.sample_rate()
    }

    /// Start delivering frames of `block_size` samples to `processor`.
    pub fn start(
        &mut self,
        processor: FrameProcessor,
        block_size: usize,
    ) -> Result<(), DeviceError> {
        let mut assembler = FrameAssembler::new(block_size);
        self.device.start(Box::new(move |samples: &[f32]| {
            assembler.push(samples, |frame| processor.process(frame));
        }))?;
        self.running = true;
        log::info!(
            "capture: streaming {} Hz → {CAPTURE_WIRE_RATE} Hz in blocks of {block_size}",
            self.device.sample_rate()
        );
        Ok(())
    }

    /// Release the microphone.  Idempotent.
    pub fn stop(&mut self) {
        self.device.stop();
        if self.running {
            self.running = false;
            log::debug!("capture: stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for CapturePath {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// MockInput (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockInput;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::{decode_base64, CAPTURE_MIME_TYPE};
    use crate::live::Outbound;
    use tokio::sync::mpsc;

    fn packets(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<EncodedPacket> {
        let mut out = Vec::new();
        while let Ok(Outbound::Audio(p)) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    #[test]
    fn assembler_emits_fixed_blocks() {
        let mut assembler = FrameAssembler::new(4);
        let mut frames: Vec<Vec<f32>> = Vec::new();

        assembler.push(&[1.0, 2.0, 3.0], |f| frames.push(f.to_vec()));
        assert!(frames.is_empty());
        assert_eq!(assembler.pending(), 3);

        assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f.to_vec()));
        assert_eq!(
            frames,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn assembler_zero_block_is_one() {
        let mut assembler = FrameAssembler::new(0);
        let mut count = 0;
        assembler.push(&[0.0; 3], |_| count += 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn processor_publishes_volume_and_sends_wire_rate_packet() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let volume = VolumeMeter::new();
        let processor = FrameProcessor::new(48_000, volume.clone(), PacketSender::new(tx));

        processor.process(&[0.5; 4800]);

        assert!((volume.get() - 0.5).abs() < 1e-6);
        let sent = packets(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mime_type, CAPTURE_MIME_TYPE);
        // 4800 samples @ 48 kHz → 1600 samples @ 16 kHz → 3200 bytes.
        assert_eq!(decode_base64(&sent[0].data).unwrap().len(), 3200);
    }

    #[test]
    fn processor_keeps_publishing_volume_without_transport() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let volume = VolumeMeter::new();
        let processor = FrameProcessor::new(16_000, volume.clone(), PacketSender::new(tx));

        processor.process(&[1.0, -1.0]);
        assert!((volume.get() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn capture_path_delivers_blocks_until_stopped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mic = MockInput::new(16_000);
        let volume = VolumeMeter::new();
        let mut capture = CapturePath::new(Box::new(mic.clone()));

        capture
            .start(
                FrameProcessor::new(capture.sample_rate(), volume.clone(), PacketSender::new(tx)),
                256,
            )
            .unwrap();
        assert!(capture.is_running());

        mic.feed(&[0.1; 300]);
        assert_eq!(packets(&mut rx).len(), 1);
        mic.feed(&[0.1; 300]);
        assert_eq!(packets(&mut rx).len(), 1);

        capture.stop();
        capture.stop();
        assert!(!capture.is_running());
        assert!(mic.is_released());
        assert!(!mic.feed(&[0.1; 512]));
        assert!(packets(&mut rx).is_empty());
    }

    #[test]
    fn released_device_cannot_restart() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mic = MockInput::new(16_000);
        let mut capture = CapturePath::new(Box::new(mic.clone()));
        capture.stop();

        let result = capture.start(
            FrameProcessor::new(16_000, VolumeMeter::new(), PacketSender::new(tx)),
            4096,
        );
        assert!(matches!(result, Err(DeviceError::Released)));
    }

    #[test]
    fn dropping_capture_path_releases_device() {
        let mic = MockInput::new(44_100);
        drop(CapturePath::new(Box::new(mic.clone())));
        assert!(mic.is_released());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn open_default_microphone() {
        use cpal::traits::HostTrait;
        if let Some(device) = cpal::default_host().default_input_device() {
            let mut mic = MicrophoneInput::open(&device).expect("open microphone");
            assert!(mic.sample_rate() > 0);
            mic.stop();
        }
    }
}
