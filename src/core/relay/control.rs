//! Control-message interpretation.
//!
//! Text frames from the remote channel are JSON records carrying a `type`
//! discriminant. They describe the call lifecycle (start, state changes,
//! transcripts, errors) and never affect the audio path: an `error` message is
//! logged but does not end the session, and a payload that fails to parse is
//! logged and skipped.

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// Control messages understood by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// The provider started the call
    CallStarted { call_id: Option<String> },
    /// Conversation state changed (e.g. "listening", "thinking", "speaking")
    State { state: Option<String> },
    /// Transcript update for either party
    Transcript(Transcript),
    /// The provider asks the client to drop buffered playback
    PlaybackClearBuffer,
    /// Provider-side error; carries the full payload
    Error(Value),
    /// Any other kind
    Other { kind: String },
}

/// Transcript payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub medium: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub ordinal: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallStartedPayload {
    #[serde(default)]
    call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatePayload {
    #[serde(default)]
    state: Option<String>,
}

/// Why a control payload could not be interpreted.
#[derive(Debug, thiserror::Error)]
pub enum ControlParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("control message is not a JSON object")]
    NotAnObject,
}

impl ControlMessage {
    /// Parse a text frame into a control message.
    ///
    /// Unknown kinds, and objects without a `type` field, map to
    /// [`ControlMessage::Other`]. Missing fields inside a known kind fall back
    /// to defaults; fields of the wrong type make the whole message malformed.
    pub fn parse(text: &str) -> Result<Self, ControlParseError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ControlParseError::NotAnObject);
        }

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("undefined")
            .to_string();

        let message = match kind.as_str() {
            "call_started" => {
                let payload: CallStartedPayload = serde_json::from_value(value)?;
                ControlMessage::CallStarted {
                    call_id: payload.call_id,
                }
            }
            "state" => {
                let payload: StatePayload = serde_json::from_value(value)?;
                ControlMessage::State {
                    state: payload.state,
                }
            }
            "transcript" => ControlMessage::Transcript(serde_json::from_value(value)?),
            "playback_clear_buffer" => ControlMessage::PlaybackClearBuffer,
            "error" => ControlMessage::Error(value),
            _ => ControlMessage::Other { kind },
        };
        Ok(message)
    }
}

/// What the interpreter did with one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    CallStarted { remote_call_id: Option<String> },
    State(Option<String>),
    FinalTranscript {
        role: String,
        medium: String,
        text: String,
    },
    /// Non-final transcript; not logged
    InterimTranscript,
    PlaybackClearBuffer,
    Error(Value),
    Unrecognized(String),
    Malformed(String),
}

/// Classifies and logs remote control messages for one session.
#[derive(Debug)]
pub struct ControlInterpreter {
    call_id: String,
    remote_call_id: Option<String>,
    last_state: Option<String>,
    messages: u64,
    malformed: u64,
}

impl ControlInterpreter {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            remote_call_id: None,
            last_state: None,
            messages: 0,
            malformed: 0,
        }
    }

    /// Interpret one text frame. Never fails; parse errors are logged and
    /// reported as [`Observation::Malformed`].
    pub fn interpret(&mut self, text: &str) -> Observation {
        self.messages += 1;

        let message = match ControlMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                self.malformed += 1;
                warn!(
                    call_id = %self.call_id,
                    error = %e,
                    "Ignoring malformed control message"
                );
                return Observation::Malformed(e.to_string());
            }
        };

        match message {
            ControlMessage::CallStarted { call_id } => {
                info!(
                    call_id = %self.call_id,
                    remote_call_id = call_id.as_deref().unwrap_or("unknown"),
                    "Call started"
                );
                self.remote_call_id = call_id.clone();
                Observation::CallStarted {
                    remote_call_id: call_id,
                }
            }
            ControlMessage::State { state } => {
                info!(
                    call_id = %self.call_id,
                    state = state.as_deref().unwrap_or("unknown"),
                    "State"
                );
                self.last_state = state.clone();
                Observation::State(state)
            }
            ControlMessage::Transcript(transcript) => {
                if !transcript.is_final {
                    return Observation::InterimTranscript;
                }
                let role = transcript.role.to_uppercase();
                let text = transcript.text.unwrap_or_default();
                info!(call_id = %self.call_id, "{} ({}): {}", role, transcript.medium, text);
                Observation::FinalTranscript {
                    role,
                    medium: transcript.medium,
                    text,
                }
            }
            ControlMessage::PlaybackClearBuffer => {
                // Pending outbound audio is intentionally left untouched
                info!(call_id = %self.call_id, "Playback clear buffer");
                Observation::PlaybackClearBuffer
            }
            ControlMessage::Error(payload) => {
                error!(call_id = %self.call_id, payload = %payload, "Remote error");
                Observation::Error(payload)
            }
            ControlMessage::Other { kind } => {
                info!(call_id = %self.call_id, kind = %kind, "Received message type");
                Observation::Unrecognized(kind)
            }
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn remote_call_id(&self) -> Option<&str> {
        self.remote_call_id.as_deref()
    }

    pub fn last_state(&self) -> Option<&str> {
        self.last_state.as_deref()
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_started_records_remote_id() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        let obs = interpreter.interpret(r#"{"type":"call_started","callId":"uv-42"}"#);

        assert_eq!(
            obs,
            Observation::CallStarted {
                remote_call_id: Some("uv-42".to_string())
            }
        );
        assert_eq!(interpreter.remote_call_id(), Some("uv-42"));
    }

    #[test]
    fn test_state_is_recorded() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        interpreter.interpret(r#"{"type":"state","state":"listening"}"#);
        let obs = interpreter.interpret(r#"{"type":"state","state":"speaking"}"#);

        assert_eq!(obs, Observation::State(Some("speaking".to_string())));
        assert_eq!(interpreter.last_state(), Some("speaking"));
    }

    #[test]
    fn test_final_transcript_is_emitted() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        let obs = interpreter.interpret(
            r#"{"type":"transcript","role":"agent","medium":"voice","text":"Hello there","final":true,"ordinal":3}"#,
        );

        assert_eq!(
            obs,
            Observation::FinalTranscript {
                role: "AGENT".to_string(),
                medium: "voice".to_string(),
                text: "Hello there".to_string(),
            }
        );
    }

    #[test]
    fn test_interim_transcript_is_ignored() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        let obs = interpreter
            .interpret(r#"{"type":"transcript","role":"user","medium":"voice","delta":"Hel","final":false}"#);
        assert_eq!(obs, Observation::InterimTranscript);

        let obs = interpreter.interpret(r#"{"type":"transcript","role":"user","text":"Hi"}"#);
        assert_eq!(obs, Observation::InterimTranscript);
    }

    #[test]
    fn test_playback_clear_buffer() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        let obs = interpreter.interpret(r#"{"type":"playback_clear_buffer"}"#);
        assert_eq!(obs, Observation::PlaybackClearBuffer);
    }

    #[test]
    fn test_error_keeps_full_payload() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        let obs = interpreter.interpret(r#"{"type":"error","message":"quota exceeded","code":429}"#);

        assert_eq!(
            obs,
            Observation::Error(json!({"type": "error", "message": "quota exceeded", "code": 429}))
        );
        assert_eq!(interpreter.malformed(), 0);
    }

    #[test]
    fn test_unknown_kind() {
        let mut interpreter = ControlInterpreter::new("abc-123");
        assert_eq!(
            interpreter.interpret(r#"{"type":"debug","message":"x"}"#),
            Observation::Unrecognized("debug".to_string())
        );
        assert_eq!(
            interpreter.interpret(r#"{"message":"no type"}"#),
            Observation::Unrecognized("undefined".to_string())
        );
    }

    #[test]
    fn test_malformed_payloads_are_counted() {
        let mut interpreter = ControlInterpreter::new("abc-123");

        assert!(matches!(
            interpreter.interpret("not json at all"),
            Observation::Malformed(_)
        ));
        assert!(matches!(
            interpreter.interpret("[1,2,3]"),
            Observation::Malformed(_)
        ));
        assert!(matches!(
            interpreter.interpret(r#"{"type":"state","state":7}"#),
            Observation::Malformed(_)
        ));

        assert_eq!(interpreter.malformed(), 3);
        assert_eq!(interpreter.messages(), 3);

        // Still usable afterwards
        assert_eq!(
            interpreter.interpret(r#"{"type":"playback_clear_buffer"}"#),
            Observation::PlaybackClearBuffer
        );
    }

    #[test]
    fn test_parse_transcript_defaults() {
        let msg = ControlMessage::parse(r#"{"type":"transcript"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Transcript(Transcript::default()));
    }
}
