//! # Audio Types
//!
//! Plain data carried through the pipeline: captured frames, the constraints the
//! microphone is opened with, and decoded clips handed to the output device.
//!
//! ## Wire Format (fixed, must match on capture and playback):
//! - **Sample Rate**: 24kHz (24,000 Hz)
//! - **Bit Depth**: 16-bit PCM, little-endian, signed
//! - **Channels**: Mono (1 channel)

use std::time::Instant;

/// Sample rate of every frame sent to and received from the agent.
pub const SAMPLE_RATE: u32 = 24_000;

/// Channel count of the wire format.
pub const CHANNELS: u16 = 1;

/// Bits per PCM sample on the wire.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Samples per capture block delivered by the platform.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// An immutable block of mono float samples at [`SAMPLE_RATE`].
///
/// Produced by an [`AudioSource`](crate::audio::traits::AudioSource), encoded once and dropped.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    captured_at: Instant,
    samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            captured_at: Instant::now(),
            samples,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn duration_ms(&self) -> f32 {
        (self.samples.len() as f32 / SAMPLE_RATE as f32) * 1000.0
    }
}

/// Constraints requested when acquiring the microphone.
///
/// Backends that cannot honour the processing toggles (echo cancellation and
/// friends) treat them as advisory and log that they were ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per delivered block
    pub block_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A clip produced by decoding one wrapped playback payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl DecodedAudio {
    /// Samples scaled to [-1.0, 1.0] for float output devices.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|&sample| sample as f32 / 32768.0)
            .collect()
    }

    pub fn duration_secs(&self) -> f32 {
        let frames = self.samples.len() as f32 / self.channels.max(1) as f32;
        frames / self.sample_rate.max(1) as f32
    }
}
