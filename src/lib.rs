//! # Duplex Voice
//!
//! Realtime voice conversation client: streams microphone audio to a remote
//! agent over a WebSocket and plays the agent's synthesized replies in order.
//!
//! ## Architecture:
//! - **audio**: capture, playback queue, sample codec and device backends
//! - **protocol**: the JSON envelopes exchanged with the agent
//! - **connection**: one full-duplex WebSocket connection
//! - **state**: the observable snapshot and its transition function
//! - **session**: the controller that owns and wires all of the above
//! - **speech**: markdown cleanup for replies read aloud
//! - **config** / **error**: configuration loading and the error taxonomy

pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;
pub mod speech;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{CaptureError, PlaybackError, VoiceError, VoiceResult};
pub use session::{SessionController, SessionStats};
pub use state::{SessionState, VoiceState};
