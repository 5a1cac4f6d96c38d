// src/codecs/pcm.rs
use byteorder::{ByteOrder, LittleEndian};

use crate::core::error::CodecError;

pub const BYTES_PER_SAMPLE_I16: usize = 2;

/// Decode little-endian signed 16-bit samples into normalized floats in
/// [-1, 1]. Rejects byte streams whose length is not sample-aligned.
pub fn decode_i16le(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % BYTES_PER_SAMPLE_I16 != 0 {
        return Err(CodecError::UnalignedLength {
            len: bytes.len(),
            bytes_per_sample: BYTES_PER_SAMPLE_I16,
        });
    }

    let mut samples = Vec::with_capacity(bytes.len() / BYTES_PER_SAMPLE_I16);
    for chunk in bytes.chunks_exact(BYTES_PER_SAMPLE_I16) {
        samples.push(LittleEndian::read_i16(chunk) as f32 / 32768.0);
    }
    Ok(samples)
}

/// Encode normalized floats back to little-endian int16 bytes. Values are
/// scaled by 32768, rounded, and saturated at +/-32767.
pub fn encode_i16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE_I16);
    for &sample in samples {
        let scaled = (sample as f64 * 32768.0).round();
        let clamped = scaled.clamp(-32767.0, 32767.0) as i16;
        bytes.extend_from_slice(&clamped.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_unaligned_length() {
        assert!(decode_i16le(&[0x00, 0x01, 0x02]).is_err());
    }

    #[test]
    fn roundtrip_preserves_samples() {
        let samples = vec![0.0f32, 0.25, -0.25, 0.5, -0.99];
        let decoded = decode_i16le(&encode_i16le(&samples)).expect("decode");
        for (orig, restored) in samples.iter().zip(decoded.iter()) {
            assert!((orig - restored).abs() < 1.0 / 32768.0 + 1e-6);
        }
    }

    #[test]
    fn encode_saturates_out_of_range() {
        let bytes = encode_i16le(&[2.0, -2.0]);
        assert_eq!(LittleEndian::read_i16(&bytes[0..2]), 32767);
        assert_eq!(LittleEndian::read_i16(&bytes[2..4]), -32767);
    }

    #[test]
    fn decode_normalizes_full_scale() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16384i16.to_le_bytes());
        bytes.extend_from_slice(&(-16384i16).to_le_bytes());
        let samples = decode_i16le(&bytes).expect("decode");
        assert!((samples[0] - 0.5).abs() < 1e-6);
        assert!((samples[1] + 0.5).abs() < 1e-6);
    }
}
