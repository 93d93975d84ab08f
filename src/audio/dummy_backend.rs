//! # Dummy Audio Backend
//!
//! Used when the crate is built without the `backend-cpal` feature. Both
//! devices report themselves unavailable, so a session can still connect and
//! surfaces the capture error through its state.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::traits::{AudioSink, AudioSource};
use crate::audio::types::{AudioFrame, CaptureConstraints, DecodedAudio};
use crate::error::{CaptureError, PlaybackError};

pub struct DummySource;

#[async_trait]
impl AudioSource for DummySource {
    async fn open(
        &mut self,
        _constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        Err(CaptureError::Device(
            "Audio capture is not available in this build (missing 'backend-cpal' feature)".to_string(),
        ))
    }

    fn close(&mut self) {}
}

pub struct DummySink;

#[async_trait]
impl AudioSink for DummySink {
    async fn play(&self, _audio: DecodedAudio) -> Result<(), PlaybackError> {
        Err(PlaybackError::Output("Audio playback is not available".to_string()))
    }
}
