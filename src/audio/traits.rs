//! # Audio Device Traits
//!
//! The two seams between the voice pipeline and real hardware. Backends
//! (`cpal_backend`, `dummy_backend`) and the test doubles implement them.
//!
//! ## Capabilities:
//! - **AudioSource**: microphone, delivers fixed-size blocks over a channel
//! - **AudioSink**: speaker, decodes one container and plays it to completion

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::codec;
use crate::audio::types::{AudioFrame, CaptureConstraints, DecodedAudio};
use crate::error::{CaptureError, PlaybackError};

/// Microphone capability.
///
/// `open` acquires the device and returns a channel of fixed-size blocks. The
/// channel holds at most one block, so a slow consumer makes the platform drop
/// blocks instead of queueing them.
#[async_trait]
pub trait AudioSource: Send {
    /// Acquire the microphone and start delivering blocks
    async fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Detach processing, stop and release all tracks. Must be safe to call twice.
    fn close(&mut self);
}

/// Speaker capability used by the playback queue.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Decode one wrapped container. The default uses the `wav` reader.
    async fn decode(&self, container: &[u8]) -> Result<DecodedAudio, PlaybackError> {
        codec::decode_container(container)
    }

    /// Play a clip to completion
    async fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError>;

    /// Cut off whatever is currently sounding.
    fn stop(&self) {}
}
