//! # Audio Pipeline
//!
//! Everything between the microphone/speaker and the agent connection.
//!
//! ## Key Components:
//! - **codec**: float ↔ PCM16LE conversion, chunked base64, WAV wrapping
//! - **capture**: forwards microphone blocks to the agent
//! - **playback**: plays received audio strictly in order, one clip at a time
//! - **traits**: `AudioSource` / `AudioSink` device seams
//!
//! ## Backends:
//! - `cpal_backend` (feature `backend-cpal`): default input and output devices
//! - `dummy_backend` (otherwise): reports audio as unavailable

pub mod capture;
pub mod codec;
pub mod playback;
pub mod traits;
pub mod types;

#[cfg(feature = "backend-cpal")]
pub mod cpal_backend;

#[cfg(not(feature = "backend-cpal"))]
pub mod dummy_backend;

use std::sync::Arc;
use traits::{AudioSink, AudioSource};

/// Devices for the current build.
#[cfg(feature = "backend-cpal")]
pub fn default_backend() -> (Box<dyn AudioSource>, Arc<dyn AudioSink>) {
    (
        Box::new(cpal_backend::CpalSource::new()),
        Arc::new(cpal_backend::CpalSink::new()),
    )
}

/// Devices for the current build.
#[cfg(not(feature = "backend-cpal"))]
pub fn default_backend() -> (Box<dyn AudioSource>, Arc<dyn AudioSink>) {
    (
        Box::new(dummy_backend::DummySource),
        Arc::new(dummy_backend::DummySink),
    )
}
