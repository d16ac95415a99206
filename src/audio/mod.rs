//! Audio: microphone capture, rate conversion, PCM16 wire codec, level metering
//! and device selection.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → stereo_to_mono → FrameAssembler (4096)
//!           → rms → VolumeMeter
//!           → resample(native → 16 kHz) → encode_pcm16 → base64 → EncodedPacket
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use live_voice::audio::{encode_pcm16, decode_pcm16, resample};
//!
//! let frame = vec![0.25_f32; 4800];           // 100 ms @ 48 kHz
//! let wire = resample(&frame, 48_000, 16_000); // 1600 samples
//! let bytes = encode_pcm16(&wire);
//! assert_eq!(decode_pcm16(&bytes).len(), wire.len());
//! ```

pub mod capture;
pub mod codec;
pub mod device;
pub mod level;
pub mod resample;

pub use capture::{
    CapturePath, DeviceError, FrameAssembler, FrameProcessor, FrameSink, InputDevice,
    MicrophoneInput,
};
pub use codec::{
    decode_base64, decode_pcm16, encode_base64, encode_pcm16, DecodeError, EncodedPacket,
    CAPTURE_MIME_TYPE, CAPTURE_WIRE_RATE, PLAYBACK_WIRE_RATE,
};
pub use device::{AudioBackend, CpalBackend};
pub use level::{rms, VolumeMeter};
pub use resample::{resample, stereo_to_mono};

#[cfg(test)]
pub use capture::MockInput;
#[cfg(test)]
pub use device::MockBackend;
