//! Real-time full-duplex voice pipeline for a live speech-AI session.
//!
//! Microphone frames are metered, resampled to 16 kHz, encoded as PCM16 and
//! streamed to the remote service; synthesized 24 kHz speech coming back is
//! scheduled for gapless playback and cut immediately when the user barges
//! in.
//!
//! * [`audio`]: capture, resampling, PCM16 codec, level metering, devices.
//! * [`live`]: session contract and the websocket transport.
//! * [`playback`]: output clock, mixer and the gapless scheduler.
//! * [`pipeline`]: lifecycle controller, transcript and observable state.
//! * [`config`]: TOML settings.

pub mod audio;
pub mod config;
pub mod live;
pub mod pipeline;
pub mod playback;
