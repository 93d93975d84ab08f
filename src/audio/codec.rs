//! # Sample Codec
//!
//! Pure conversions between the representations audio takes on its way through the
//! pipeline:
//!
//! ```text
//! f32 samples ──quantize──▶ i16 PCM ──bytes──▶ PCM16LE ──base64──▶ wire text
//! wire text ──base64──▶ PCM16LE ──wrap──▶ WAV container ──decoder──▶ DecodedAudio
//! ```
//!
//! ## Key Functions:
//! - **encode_samples**: capture path, float block to transport text
//! - **decode_samples**: inverse of `encode_samples`, used for verification and tooling
//! - **wrap_pcm**: builds the 44-byte RIFF/WAVE header around raw PCM
//! - **decode_container**: reads a wrapped payload back with the `wav` decoder
//!
//! ## Chunked Text Encoding:
//! Bytes are converted to base64 in windows of at most 32 KiB. Windows are cut on
//! 3-byte boundaries so the concatenated output is identical to encoding the whole
//! buffer at once.

use crate::audio::types::{DecodedAudio, BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use crate::error::PlaybackError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{ByteOrder, LittleEndian};
use std::io::Cursor;

/// Upper bound for a single byte-to-text conversion.
pub const MAX_ENCODE_WINDOW: usize = 32 * 1024;

/// Window actually used: the largest multiple of 3 that fits in [`MAX_ENCODE_WINDOW`].
const ENCODE_WINDOW: usize = MAX_ENCODE_WINDOW - MAX_ENCODE_WINDOW % 3;

/// Size of the RIFF/WAVE header produced by [`wrap_pcm`].
pub const WAV_HEADER_LEN: usize = 44;

const WAV_FORMAT_PCM: u16 = 1;

/// Quantize float samples to 16-bit PCM.
///
/// Samples are clamped to [-1, 1]; negative values scale by 32768 and the rest by
/// 32767, then truncate toward zero.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// Serialize PCM samples as little-endian bytes.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

/// Read little-endian PCM bytes back into samples. A trailing odd byte is ignored.
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    let even = bytes.len() - bytes.len() % 2;
    let mut samples = vec![0i16; even / 2];
    LittleEndian::read_i16_into(&bytes[..even], &mut samples);
    samples
}

/// Base64-encode bytes, converting at most 32 KiB per call.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for window in bytes.chunks(ENCODE_WINDOW) {
        STANDARD.encode_string(window, &mut text);
    }
    text
}

/// Decode transport text back into raw bytes.
pub fn text_to_bytes(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// Capture path: float block to the text carried in `input_audio_buffer.append`.
pub fn encode_samples(samples: &[f32]) -> String {
    bytes_to_text(&pcm_to_bytes(&float_to_pcm(samples)))
}

/// Inverse of [`encode_samples`], yielding the quantized PCM values.
pub fn decode_samples(text: &str) -> Result<Vec<i16>, base64::DecodeError> {
    Ok(bytes_to_pcm(&text_to_bytes(text)?))
}

/// Wrap raw PCM16LE (24kHz mono) in a minimal RIFF/WAVE container.
///
/// The payload is copied unchanged after a 44-byte header. Input is assumed to be
/// well formed.
pub fn wrap_pcm(pcm: &[u8]) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = SAMPLE_RATE * block_align as u32;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    LittleEndian::write_u32(&mut header[4..8], 36 + data_len);
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    LittleEndian::write_u32(&mut header[16..20], 16);
    LittleEndian::write_u16(&mut header[20..22], WAV_FORMAT_PCM);
    LittleEndian::write_u16(&mut header[22..24], CHANNELS);
    LittleEndian::write_u32(&mut header[24..28], SAMPLE_RATE);
    LittleEndian::write_u32(&mut header[28..32], byte_rate);
    LittleEndian::write_u16(&mut header[32..34], block_align);
    LittleEndian::write_u16(&mut header[34..36], BITS_PER_SAMPLE);
    header[36..40].copy_from_slice(b"data");
    LittleEndian::write_u32(&mut header[40..44], data_len);

    let mut container = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    container.extend_from_slice(&header);
    container.extend_from_slice(pcm);
    container
}

/// Decode a wrapped container with the generic `wav` reader.
///
/// `wav` 1.x deprecates its `read`/`BitDepth` API ahead of a rewrite; the lint is
/// allowed here only, where that API is used.
#[allow(deprecated)]
pub fn decode_container(container: &[u8]) -> Result<DecodedAudio, PlaybackError> {
    if container.len() < WAV_HEADER_LEN
        || &container[0..4] != b"RIFF"
        || &container[8..12] != b"WAVE"
    {
        return Err(PlaybackError::Decode("not a RIFF/WAVE container".to_string()));
    }

    let mut reader = Cursor::new(container);
    let (header, data) =
        wav::read(&mut reader).map_err(|e| PlaybackError::Decode(e.to_string()))?;

    let samples = match data {
        wav::BitDepth::Sixteen(samples) => samples,
        wav::BitDepth::Empty => Vec::new(),
        _ => {
            return Err(PlaybackError::Decode(format!(
                "unsupported bit depth: {}",
                header.bits_per_sample
            )))
        }
    };

    Ok(DecodedAudio {
        sample_rate: header.sampling_rate,
        channels: header.channel_count,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantization() {
        let samples = [0.0, 0.5, -0.5, 1.0, -1.0, 1.5, -2.0, 0.25];
        let pcm = float_to_pcm(&samples);
        assert_eq!(pcm, vec![0, 16383, -16384, 32767, -32768, 32767, -32768, 8191]);
    }

    #[test]
    fn test_encode_decode_reproduces_quantized_values() {
        let samples: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.013).sin() * 0.8)
            .collect();
        let text = encode_samples(&samples);
        let decoded = decode_samples(&text).unwrap();
        assert_eq!(decoded, float_to_pcm(&samples));
    }

    #[test]
    fn test_chunk_boundary_is_transparent() {
        // Three and a bit windows, with a length that is not a multiple of 3
        let bytes: Vec<u8> = (0..(MAX_ENCODE_WINDOW * 3 + 1001))
            .map(|i| (i % 251) as u8)
            .collect();
        assert_eq!(bytes_to_text(&bytes), STANDARD.encode(&bytes));
    }

    #[test]
    fn test_small_input_encoding() {
        // Four zero samples
        assert_eq!(encode_samples(&[0.0; 4]), "AAAAAAAAAAA=");
        assert_eq!(bytes_to_text(&[]), "");
    }

    #[test]
    fn test_wrap_layout() {
        let pcm = pcm_to_bytes(&[1, -1, 300, -300, 0]);
        let container = wrap_pcm(&pcm);

        assert_eq!(container.len(), WAV_HEADER_LEN + pcm.len());
        assert_eq!(&container[0..4], b"RIFF");
        assert_eq!(LittleEndian::read_u32(&container[4..8]), 36 + pcm.len() as u32);
        assert_eq!(&container[8..16], b"WAVEfmt ");
        assert_eq!(LittleEndian::read_u16(&container[20..22]), 1);
        assert_eq!(LittleEndian::read_u16(&container[22..24]), 1);
        assert_eq!(LittleEndian::read_u32(&container[24..28]), 24_000);
        assert_eq!(LittleEndian::read_u32(&container[28..32]), 48_000);
        assert_eq!(LittleEndian::read_u16(&container[32..34]), 2);
        assert_eq!(LittleEndian::read_u16(&container[34..36]), 16);
        assert_eq!(&container[36..40], b"data");
        assert_eq!(LittleEndian::read_u32(&container[40..44]), pcm.len() as u32);
        assert_eq!(&container[WAV_HEADER_LEN..], &pcm[..]);
    }

    #[test]
    fn test_wrapped_container_decodes() {
        let samples = vec![0i16, 1200, -1200, 32767, -32768, 7];
        let decoded = decode_container(&wrap_pcm(&pcm_to_bytes(&samples))).unwrap();
        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn test_garbage_container_fails() {
        assert!(matches!(
            decode_container(b"definitely not audio"),
            Err(PlaybackError::Decode(_))
        ));
    }
}
