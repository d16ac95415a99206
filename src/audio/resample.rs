//! Sample-rate conversion and channel mixing.
//!
//! The live session speaks fixed wire rates (16 kHz up, 24 kHz down) while the
//! microphone and speaker run at whatever rate the device picked.  This module
//! bridges the two:
//!
//! 1. [`stereo_to_mono`]: downmix interleaved device frames to mono.
//! 2. [`resample`]: linear-interpolation rate conversion between any two rates.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is dropped.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec` with no
///   averaging.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use live_voice::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `input_rate` Hz to `output_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return the input unchanged.
/// * The output holds `round(len * output_rate / input_rate)` samples.
/// * Output sample `i` reads source position `i * input_rate / output_rate`
///   and blends the floor and ceil neighbours by the fractional part.  A
///   neighbour past the end of the buffer clamps to the last sample.
///
/// # Example
///
/// ```rust
/// use live_voice::audio::resample;
///
/// let native = vec![0.5_f32; 480]; // 10 ms @ 48 kHz
/// let wire = resample(&native, 48_000, 16_000);
/// assert_eq!(wire.len(), 160);
///
/// let same = resample(&native, 48_000, 48_000);
/// assert_eq!(same, native);
/// ```
pub fn resample(samples: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    if input_rate == output_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || input_rate == 0 || output_rate == 0 {
        return Vec::new();
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let output_len = (samples.len() as f64 / ratio).round() as usize;
    let last = samples.len() - 1;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let low = src_pos.floor() as usize;
        let high = src_pos.ceil() as usize;
        let weight = (src_pos - low as f64) as f32;

        let a = samples[low.min(last)];
        let b = samples[high.min(last)];

        output.push(a * (1.0 - weight) + b * weight);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
