//! PCM16 wire codec.
//!
//! Outbound microphone audio travels as base64 little-endian signed 16-bit
//! PCM at 16 kHz; inbound model audio arrives in the same format at 24 kHz.
//!
//! The float → int conversion is deliberately asymmetric: negative samples
//! scale by 32768, non-negative samples by 32767.  Decoding divides by 32768
//! for every sample.  Keep it that way; the remote end expects exactly these
//! bit patterns.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample rate of every outbound [`EncodedPacket`].
pub const CAPTURE_WIRE_RATE: u32 = 16_000;

/// Sample rate of every inbound audio chunk.
pub const PLAYBACK_WIRE_RATE: u32 = 24_000;

/// Descriptor attached to outbound packets.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// An inbound audio payload could not be turned into samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

// ---------------------------------------------------------------------------
// PCM16
// ---------------------------------------------------------------------------

/// Encode float samples as little-endian PCM16 bytes.
///
/// Samples are clamped to `[-1.0, 1.0]` first.
///
/// ```rust
/// use live_voice::audio::encode_pcm16;
///
/// let bytes = encode_pcm16(&[-1.0, 0.0, 1.0]);
/// assert_eq!(bytes, vec![0x00, 0x80, 0x00, 0x00, 0xFF, 0x7F]);
/// ```
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
        bytes.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    bytes
}

/// Decode little-endian PCM16 bytes into float samples in `[-1.0, 1.0)`.
///
/// An odd trailing byte is read as the low byte of a final sample whose high
/// byte is zero.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len().div_ceil(2));
    let mut pairs = bytes.chunks_exact(2);
    for pair in pairs.by_ref() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        samples.push(f32::from(value) / 32768.0);
    }
    if let [low] = pairs.remainder() {
        samples.push(f32::from(i16::from_le_bytes([*low, 0])) / 32768.0);
    }
    samples
}

// ---------------------------------------------------------------------------
// base64
// ---------------------------------------------------------------------------

/// Decode a base64 payload, accepting the URL-safe alphabet as well.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    if text.contains(['-', '_']) {
        let standard = text.replace('-', "+").replace('_', "/");
        return Ok(STANDARD.decode(standard)?);
    }
    Ok(STANDARD.decode(text)?)
}

/// Encode raw bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

// ---------------------------------------------------------------------------
// EncodedPacket
// ---------------------------------------------------------------------------

/// One unit of outbound microphone audio: 16 kHz mono PCM16, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPacket {
    pub data: String,
    pub mime_type: String,
}

impl EncodedPacket {
    /// Build a packet from samples that are already at [`CAPTURE_WIRE_RATE`].
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            data: encode_base64(&encode_pcm16(samples)),
            mime_type: CAPTURE_MIME_TYPE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asymmetric_scaling_at_full_scale() {
        let bytes = encode_pcm16(&[-1.0, 1.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), -32768);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let bytes = encode_pcm16(&[-3.5, 2.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), -32768);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
    }

    #[test]
    fn conversion_truncates_toward_zero() {
        // 0.5 * 32767 = 16383.5 → 16383; -0.5 * 32768 = -16384 exactly.
        let bytes = encode_pcm16(&[0.5, -0.5]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 16383);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -16384);
    }

    #[test]
    fn decode_divides_by_32768() {
        let samples = decode_pcm16(&[0x00, 0x80, 0x00, 0x40, 0xFF, 0x7F]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], -1.0);
        assert_eq!(samples[1], 0.5);
        assert!((samples[2] - 32767.0 / 32768.0).abs() < 1e-9);
    }

    #[test]
    fn odd_length_pads_trailing_byte() {
        let samples = decode_pcm16(&[0x00, 0x40, 0x10]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1], 16.0 / 32768.0);
    }

    #[test]
    fn pcm_round_trip_within_one_step() {
        let input: Vec<f32> = (0..2000)
            .map(|i| ((i as f32) * 0.013).sin() * 0.999)
            .collect();
        let output = decode_pcm16(&encode_pcm16(&input));
        assert_eq!(output.len(), input.len());
        for (a, b) in input.iter().zip(&output) {
            assert!(
                (a - b).abs() <= 1.0 / 32768.0 + 1e-6,
                "round trip drift: {a} -> {b}"
            );
        }
    }

    #[test]
    fn positive_full_scale_reads_back_slightly_low() {
        let output = decode_pcm16(&encode_pcm16(&[1.0]));
        assert!(output[0] < 1.0);
        assert!(1.0 - output[0] <= 1.0 / 32768.0 + 1e-6);
    }

    #[test]
    fn url_safe_base64_is_accepted() {
        let bytes = vec![0xFB, 0xFF, 0xBF, 0x00];
        let standard = encode_base64(&bytes);
        assert!(standard.contains('+') || standard.contains('/'));
        let url_safe = standard.replace('+', "-").replace('/', "_");
        assert_eq!(decode_base64(&url_safe).unwrap(), bytes);
        assert_eq!(decode_base64(&standard).unwrap(), bytes);
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        assert!(matches!(
            decode_base64("not base64!!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn packet_carries_mime_type_and_serialises_camel_case() {
        let packet = EncodedPacket::from_samples(&[0.0, 0.25]);
        assert_eq!(packet.mime_type, CAPTURE_MIME_TYPE);
        assert_eq!(decode_base64(&packet.data).unwrap().len(), 4);

        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert!(json["data"].is_string());
    }
}
