//! Input level metering for the caller's volume indicator.
//!
//! The capture callback computes one RMS value per frame with [`rms`] and
//! publishes it through a [`VolumeMeter`].  The meter is a single atomic cell
//! so the audio thread never takes a lock to update it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Root-mean-square of `frame`: `sqrt(mean(sample^2))`.
///
/// Returns `0.0` for an empty frame.
///
/// ```rust
/// use live_voice::audio::rms;
///
/// assert_eq!(rms(&[]), 0.0);
/// assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
/// ```
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt()
}

/// Latest volume sample, shared between the capture thread and readers.
///
/// Cheap to clone; all clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct VolumeMeter {
    bits: Arc<AtomicU32>,
}

impl VolumeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the current volume.
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Most recently published volume.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.set(0.0);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero() {
        assert_eq!(rms(&[0.0; 4096]), 0.0);
    }

    #[test]
    fn full_scale_square_wave_is_one() {
        let frame: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((rms(&frame) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sine_rms_is_amplitude_over_root_two() {
        let frame: Vec<f32> = (0..48_000)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / 48_000.0).sin() * 0.8)
            .collect();
        let expected = 0.8 / std::f32::consts::SQRT_2;
        assert!((rms(&frame) - expected).abs() < 1e-3);
    }

    #[test]
    fn meter_starts_at_zero_and_is_shared() {
        let meter = VolumeMeter::new();
        let reader = meter.clone();
        assert_eq!(reader.get(), 0.0);

        meter.set(0.42);
        assert_eq!(reader.get(), 0.42);

        reader.reset();
        assert_eq!(meter.get(), 0.0);
    }

    #[test]
    fn meter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VolumeMeter>();
    }
}
