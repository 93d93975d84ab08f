//! # Agent Protocol
//!
//! JSON envelopes exchanged with the remote agent. Every message is a UTF-8 text
//! frame whose `type` field selects the variant.
//!
//! ## Message Format:
//! - **Client → Agent**: `input_audio_buffer.append` with base64 PCM16LE, 24kHz, mono,
//!   and `response.create` to have the agent read a text aloud
//! - **Agent → Client**: session lifecycle, VAD signals, transcripts, synthesized audio, errors
//!
//! Unrecognized inbound types deserialize to [`InboundEvent::Unknown`] and are ignored.

use serde::{Deserialize, Serialize};

/// Messages sent to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    /// One encoded capture block
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64 PCM16LE, 24kHz, mono
        audio: String,
    },

    /// Ask the agent to produce a response outside the normal voice turn
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseRequest },
}

/// Body of a `response.create` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRequest {
    pub modalities: Vec<String>,
    pub instructions: String,
}

impl OutboundEvent {
    pub fn append(audio: String) -> Self {
        OutboundEvent::InputAudioBufferAppend { audio }
    }

    /// Have the agent read `text` aloud, verbatim.
    pub fn speak(text: &str) -> Self {
        OutboundEvent::ResponseCreate {
            response: ResponseRequest {
                modalities: vec!["audio".to_string(), "text".to_string()],
                instructions: format!("Read the following text aloud exactly as written: {}", text),
            },
        }
    }
}

/// Messages received from the agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// Server-side VAD detected the start of user speech
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Server-side VAD detected the end of user speech
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Final text of one user utterance
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    /// A new assistant response begins
    #[serde(rename = "response.created")]
    ResponseCreated,

    /// Incremental assistant text
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        delta: String,
    },

    /// End of one assistant text segment
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone,

    /// One chunk of synthesized speech
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64 PCM16LE, 24kHz, mono
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// End of one full assistant turn
    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorDetail,
    },

    #[serde(other)]
    Unknown,
}

/// Body of an `error` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorDetail {
    /// The agent's message verbatim, or a generic fallback when it sent none.
    pub fn message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Unknown agent error".to_string())
    }
}

impl InboundEvent {
    /// The wire name of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::SessionCreated => "session.created",
            InboundEvent::SessionUpdated => "session.updated",
            InboundEvent::SpeechStarted => "input_audio_buffer.speech_started",
            InboundEvent::SpeechStopped => "input_audio_buffer.speech_stopped",
            InboundEvent::InputTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            InboundEvent::ResponseCreated => "response.created",
            InboundEvent::AudioTranscriptDelta { .. } => "response.audio_transcript.delta",
            InboundEvent::AudioTranscriptDone => "response.audio_transcript.done",
            InboundEvent::AudioDelta { .. } => "response.audio.delta",
            InboundEvent::AudioDone => "response.audio.done",
            InboundEvent::ResponseDone => "response.done",
            InboundEvent::Error { .. } => "error",
            InboundEvent::Unknown => "unknown",
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<InboundEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_serialization() {
        let json = serde_json::to_string(&OutboundEvent::append("AAAA".to_string())).unwrap();
        assert_eq!(json, r#"{"type":"input_audio_buffer.append","audio":"AAAA"}"#);
    }

    #[test]
    fn test_speak_request_serialization() {
        let json = serde_json::to_value(OutboundEvent::speak("Guten Tag")).unwrap();
        assert_eq!(json["type"], "response.create");
        assert_eq!(json["response"]["modalities"], serde_json::json!(["audio", "text"]));
        assert!(json["response"]["instructions"]
            .as_str()
            .unwrap()
            .ends_with(": Guten Tag"));
    }

    #[test]
    fn test_parse_payload_events() {
        let event = parse_inbound(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"x","transcript":"hallo"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::InputTranscriptionCompleted {
                transcript: "hallo".to_string()
            }
        );

        let event = parse_inbound(r#"{"type":"response.audio.delta","delta":"AAAA"}"#).unwrap();
        assert_eq!(event, InboundEvent::AudioDelta { delta: "AAAA".to_string() });
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let event = parse_inbound(
            r#"{"type":"session.created","event_id":"e1","session":{"id":"s1","voice":"alloy"}}"#,
        )
        .unwrap();
        assert_eq!(event, InboundEvent::SessionCreated);
    }

    #[test]
    fn test_parse_error_event() {
        let event =
            parse_inbound(r#"{"type":"error","error":{"message":"rate limited","code":"429"}}"#)
                .unwrap();
        match event {
            InboundEvent::Error { error } => {
                assert_eq!(error.message(), "rate limited");
                assert_eq!(error.code.as_deref(), Some("429"));
            }
            other => panic!("Wrong event: {:?}", other),
        }

        let bare = parse_inbound(r#"{"type":"error"}"#).unwrap();
        assert_eq!(bare.kind(), "error");
    }

    #[test]
    fn test_unknown_type_is_forward_compatible() {
        let event = parse_inbound(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, InboundEvent::Unknown);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"delta":"no type"}"#).is_err());
    }
}
