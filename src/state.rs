//! # Session State
//!
//! The state a UI observes for one voice conversation, and the pure function
//! that folds inbound agent events into it.
//!
//! ## Two Views of the Same State:
//! - **VoiceState**: the flag-based snapshot handed to callers
//!   (`isConnected`, `isListening`, `isProcessing`, `isSpeaking`, `error`, transcripts)
//! - **SessionState**: a single derived phase, for logging and simple UIs
//!
//! ## Transitions:
//! [`VoiceState::apply`] is total: every [`InboundEvent`] either changes the
//! snapshot or is a no-op. Side effects the controller must perform (queueing
//! audio) are returned as an [`Effect`] rather than performed here.

use crate::audio::codec;
use crate::protocol::InboundEvent;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Coarse phase of a session, derived from the snapshot flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Listening,
    Processing,
    Speaking,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Speaking => "speaking",
            SessionState::Error => "error",
        }
    }
}

/// What the controller has to do after an event was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Raw PCM16LE to hand to the playback queue
    Play(Vec<u8>),
    /// An audio delta whose payload was not valid base64
    DroppedAudio,
}

/// Read-only snapshot of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    #[serde(skip)]
    pub is_connecting: bool,
    pub is_connected: bool,
    pub is_listening: bool,
    pub is_processing: bool,
    pub is_speaking: bool,
    /// The single channel for user-facing failure text
    pub error: Option<String>,
    /// Finished user utterances, joined with a space
    pub transcript: String,
    /// Assistant text of the current response
    pub assistant_transcript: String,
    /// Set when the agent marked the assistant text as complete
    pub assistant_final: bool,
    pub connected_at: Option<DateTime<Utc>>,
}

impl VoiceState {
    pub fn phase(&self) -> SessionState {
        if self.error.is_some() {
            SessionState::Error
        } else if self.is_speaking {
            SessionState::Speaking
        } else if self.is_processing {
            SessionState::Processing
        } else if self.is_listening {
            SessionState::Listening
        } else if self.is_connected {
            SessionState::Connected
        } else if self.is_connecting {
            SessionState::Connecting
        } else {
            SessionState::Disconnected
        }
    }

    /// Fold one inbound event into the snapshot.
    pub fn apply(&mut self, event: &InboundEvent) -> Effect {
        match event {
            InboundEvent::SessionCreated | InboundEvent::SessionUpdated => {
                debug!(event = event.kind(), "Agent session ready");
            }
            InboundEvent::SpeechStarted => {
                if self.is_connected {
                    self.is_processing = true;
                }
            }
            // Stays processing until the transcript resolves
            InboundEvent::SpeechStopped => {}
            InboundEvent::InputTranscriptionCompleted { transcript } => {
                let text = transcript.trim();
                if !text.is_empty() {
                    if !self.transcript.is_empty() {
                        self.transcript.push(' ');
                    }
                    self.transcript.push_str(text);
                }
            }
            InboundEvent::ResponseCreated | InboundEvent::ResponseDone => {
                self.reset_assistant();
            }
            InboundEvent::AudioTranscriptDelta { delta } => {
                self.assistant_transcript.push_str(delta);
                self.assistant_final = false;
            }
            InboundEvent::AudioTranscriptDone => {
                self.assistant_final = true;
                self.is_processing = false;
            }
            InboundEvent::AudioDelta { delta } => {
                if delta.is_empty() {
                    return Effect::None;
                }
                return match codec::text_to_bytes(delta) {
                    Ok(pcm) => Effect::Play(pcm),
                    Err(err) => {
                        warn!(error = %err, "Dropping audio delta with invalid base64");
                        Effect::DroppedAudio
                    }
                };
            }
            InboundEvent::AudioDone | InboundEvent::Unknown => {}
            InboundEvent::Error { error } => {
                warn!(code = ?error.code, message = %error.message(), "Agent reported an error");
                self.fail(error.message());
            }
        }
        Effect::None
    }

    pub fn begin_connecting(&mut self) {
        self.is_connecting = true;
        self.error = None;
    }

    pub fn mark_connected(&mut self, at: DateTime<Utc>) {
        self.is_connecting = false;
        self.is_connected = true;
        self.connected_at = Some(at);
    }

    /// Surface `message` and stop the processing indicator. The connection is untouched.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.is_processing = false;
        self.is_connecting = false;
    }

    /// The transport is gone: drop every connection-dependent flag.
    pub fn mark_disconnected(&mut self) {
        self.is_connecting = false;
        self.is_connected = false;
        self.is_listening = false;
        self.is_processing = false;
        self.is_speaking = false;
        self.connected_at = None;
    }

    fn reset_assistant(&mut self) {
        self.assistant_transcript.clear();
        self.assistant_final = false;
    }
}
