//! Device selection: turns [`AudioConfig`] into opened input and output
//! devices.
//!
//! [`AudioBackend`] is the seam the controller acquires hardware through, so
//! tests can swap in devices that need no sound card.

use cpal::traits::{DeviceTrait, HostTrait};

use super::capture::{DeviceError, InputDevice, MicrophoneInput};
use crate::config::AudioConfig;
use crate::playback::{AudioOutput, SourceEndedSender, SpeakerOutput};

/// Opens the microphone and speaker for one session.
pub trait AudioBackend {
    /// Acquire the microphone.  The returned device is not yet delivering
    /// frames.
    fn open_input(&self) -> Result<Box<dyn InputDevice>, DeviceError>;

    /// Open a suspended output.  Natural source completions go to `ended`.
    fn open_output(&self, ended: SourceEndedSender) -> Result<Box<dyn AudioOutput>, DeviceError>;
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// [`AudioBackend`] on the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    config: AudioConfig,
}

impl CpalBackend {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    fn input_device(&self) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();
        match self.config.input_device.as_deref() {
            None => host.default_input_device().ok_or(DeviceError::NoDevice),
            Some(name) => find_by_name(host.input_devices()?, name),
        }
    }

    fn output_device(&self) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();
        match self.config.output_device.as_deref() {
            None => host.default_output_device().ok_or(DeviceError::NoDevice),
            Some(name) => find_by_name(host.output_devices()?, name),
        }
    }
}

/// First device whose name contains `name`.
fn find_by_name(
    mut devices: impl Iterator<Item = cpal::Device>,
    name: &str,
) -> Result<cpal::Device, DeviceError> {
    devices
        .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
        .ok_or_else(|| DeviceError::NotFound(name.to_string()))
}

impl AudioBackend for CpalBackend {
    fn open_input(&self) -> Result<Box<dyn InputDevice>, DeviceError> {
        let device = self.input_device()?;
        Ok(Box::new(MicrophoneInput::open(&device)?))
    }

    fn open_output(&self, ended: SourceEndedSender) -> Result<Box<dyn AudioOutput>, DeviceError> {
        let device = self.output_device()?;
        Ok(Box::new(SpeakerOutput::open(
            &device,
            ended,
            self.config.output_gain,
        )?))
    }
}

// ---------------------------------------------------------------------------
// MockBackend (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockBackend;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires audio hardware"]
    fn unknown_input_name_is_not_found() {
        let backend = CpalBackend::new(AudioConfig {
            input_device: Some("no device is ever called this".into()),
            ..AudioConfig::default()
        });
        assert!(matches!(
            backend.open_input(),
            Err(DeviceError::NotFound(_))
        ));
    }

    #[test]
    fn default_backend_uses_default_audio_config() {
        let backend = CpalBackend::default();
        assert!(backend.config.input_device.is_none());
        assert_eq!(backend.config.capture_block_size, 4096);
    }
}
