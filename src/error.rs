//! # Error Handling
//!
//! Error types for the voice pipeline. Every component reports failures through one
//! of these enums; the session controller turns them into state updates, so only
//! connection establishment ever reaches the caller as an `Err`.
//!
//! ## Error Categories:
//! - **Connection**: open failure, handshake timeout, transport failure (fixed user message),
//!   or an operation that needs a connection while there is none
//! - **Capture**: microphone denied or unavailable (message carries the underlying detail)
//! - **Playback**: one payload failed to decode or play (isolated per item, never fatal)
//! - **Protocol**: malformed inbound JSON (logged and skipped)
//! - **Config**: invalid configuration file or environment
//!
//! ## Rust Concepts:
//! - **#[derive(Error)]**: `thiserror` writes the `Display` and `std::error::Error` impls
//!   from the `#[error("...")]` attributes
//! - **#[from]**: generates a `From` impl, so `?` converts the inner error automatically
//! - **Clone on CaptureError**: a scripted or cached failure can be handed out more than once

use std::time::Duration;   // Handshake timeout carried in ConnectTimeout
use thiserror::Error;      // Derives Display and std::error::Error for the enums below

/// User-facing text for a failed connection attempt.
pub const CONNECTION_FAILED_MESSAGE: &str = "Could not connect to the voice agent";

/// User-facing text for a connection that dropped with a transport error.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection to the voice agent was lost";

/// Top-level error for the voice pipeline.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// The WebSocket could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// The agent did not complete the handshake in time
    #[error("Connection timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    /// An operation needs an open connection and there is none
    #[error("Not connected to the voice agent")]
    NotConnected,

    /// An inbound message could not be parsed
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Configuration file or environment problems
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl VoiceError {
    /// The text shown to the user for this error.
    ///
    /// Connection problems collapse to one fixed message; everything else is
    /// surfaced with its own detail.
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::Connection(_) | VoiceError::ConnectTimeout(_) => {
                CONNECTION_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Microphone acquisition failures.
///
/// The variants follow the failure classes platforms report when asking for an
/// input device, each rendered with a message a user can act on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Microphone access denied, allow it in the system settings: {0}")]
    PermissionDenied(String),

    #[error("No microphone found, connect one and retry: {0}")]
    NotFound(String),

    #[error("Microphone is already in use by another application: {0}")]
    Busy(String),

    #[error("Microphone settings not supported: {0}")]
    Unsupported(String),

    #[error("Microphone error: {0}")]
    Device(String),
}

/// Failures for a single playback item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Could not decode audio: {0}")]
    Decode(String),

    #[error("Audio output failed: {0}")]
    Output(String),
}

/// Type alias for Results that use the pipeline's error type.
pub type VoiceResult<T> = Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_use_fixed_message() {
        let refused = VoiceError::Connection("connection refused".to_string());
        let timeout = VoiceError::ConnectTimeout(Duration::from_secs(10));
        assert_eq!(refused.user_message(), CONNECTION_FAILED_MESSAGE);
        assert_eq!(timeout.user_message(), CONNECTION_FAILED_MESSAGE);
        assert_eq!(timeout.to_string(), "Connection timed out after 10000ms");
    }

    #[test]
    fn test_capture_error_keeps_detail() {
        let err: VoiceError = CaptureError::PermissionDenied("NotAllowedError".to_string()).into();
        let message = err.user_message();
        assert!(message.starts_with("Microphone access denied"));
        assert!(message.contains("NotAllowedError"));
    }
}
