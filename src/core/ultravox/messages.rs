//! Ultravox REST message types.
//!
//! The call-creation request is a camelCase JSON object. Agent calls only
//! carry `metadata` and `medium`; generic calls add the prompt, voice and
//! call limits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{CallType, ExternalVoice, UltravoxConfig};

/// Sample rate requested for both directions of the server WebSocket medium.
pub const ULTRAVOX_SAMPLE_RATE: u32 = 8000;

// =============================================================================
// Create Call Request
// =============================================================================

/// Body of `POST /agents/{id}/calls` and `POST /calls`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub metadata: CallMetadata,
    pub medium: CallMedium,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_voice: Option<ExternalVoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vad_settings: Option<Value>,
}

/// Correlates the provider call with the client's call id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallMetadata {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallMedium {
    pub server_web_socket: ServerWebSocketMedium,
}

/// Raw audio over a server-side WebSocket.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerWebSocketMedium {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub client_buffer_size_ms: u32,
}

/// External TTS voice, keyed by provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum ExternalVoicePayload {
    #[serde(rename = "elevenLabs")]
    ElevenLabs(ElevenLabsVoice),
    #[serde(rename = "cartesia")]
    Cartesia(CartesiaVoice),
    #[serde(rename = "lmnt")]
    Lmnt(LmntVoice),
    #[serde(rename = "generic")]
    Generic(GenericVoice),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElevenLabsVoice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub model: String,
    pub speed: f64,
    pub use_speaker_boost: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartesiaVoice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub model: String,
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LmntVoice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub model: String,
    pub speed: f64,
    pub conversational: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenericVoice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub headers: Value,
    pub body: Value,
    pub response_sample_rate: u32,
    pub response_words_per_minute: u32,
    pub response_mime_type: String,
    pub json_audio_field_path: String,
}

impl From<&ExternalVoice> for ExternalVoicePayload {
    fn from(voice: &ExternalVoice) -> Self {
        match voice.clone() {
            ExternalVoice::ElevenLabs {
                voice_id,
                model,
                speed,
                use_speaker_boost,
            } => Self::ElevenLabs(ElevenLabsVoice {
                voice_id,
                model,
                speed,
                use_speaker_boost,
            }),
            ExternalVoice::Cartesia {
                voice_id,
                model,
                speed,
            } => Self::Cartesia(CartesiaVoice {
                voice_id,
                model,
                speed,
            }),
            ExternalVoice::Lmnt {
                voice_id,
                model,
                speed,
                conversational,
            } => Self::Lmnt(LmntVoice {
                voice_id,
                model,
                speed,
                conversational,
            }),
            ExternalVoice::Generic {
                url,
                headers,
                body,
                response_sample_rate,
                response_words_per_minute,
                response_mime_type,
                json_audio_field_path,
            } => Self::Generic(GenericVoice {
                url,
                headers,
                body,
                response_sample_rate,
                response_words_per_minute,
                response_mime_type,
                json_audio_field_path,
            }),
        }
    }
}

impl CreateCallRequest {
    /// Build the request for one call from the provider configuration.
    pub fn new(config: &UltravoxConfig, call_id: &str) -> Self {
        let metadata = CallMetadata {
            uuid: call_id.to_string(),
        };
        let medium = CallMedium {
            server_web_socket: ServerWebSocketMedium {
                input_sample_rate: ULTRAVOX_SAMPLE_RATE,
                output_sample_rate: ULTRAVOX_SAMPLE_RATE,
                client_buffer_size_ms: config.client_buffer_size_ms,
            },
        };

        if config.call_type == CallType::Agent {
            return Self {
                system_prompt: None,
                temperature: None,
                model: None,
                voice: None,
                metadata,
                medium,
                recording_enabled: None,
                join_timeout: None,
                max_duration: None,
                external_voice: None,
                selected_tools: None,
                vad_settings: None,
            };
        }

        let generic = &config.generic;
        Self {
            system_prompt: Some(generic.system_prompt.clone()),
            temperature: Some(generic.temperature),
            model: Some(generic.model.clone()),
            voice: Some(generic.voice.clone()),
            metadata,
            medium,
            recording_enabled: Some(generic.recording_enabled),
            join_timeout: Some(generic.join_timeout.clone()),
            max_duration: Some(generic.max_duration.clone()),
            external_voice: generic.external_voice.as_ref().map(ExternalVoicePayload::from),
            selected_tools: parse_raw_json("ULTRAVOX_SELECTED_TOOLS", &generic.selected_tools),
            vad_settings: parse_raw_json("ULTRAVOX_VAD_SETTINGS", &generic.vad_settings),
        }
    }
}

/// Invalid JSON is logged and the field omitted.
fn parse_raw_json(name: &str, raw: &Option<String>) -> Option<Value> {
    let raw = raw.as_deref()?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Invalid {} JSON format: {}", name, e);
            None
        }
    }
}

// =============================================================================
// Create Call Response
// =============================================================================

/// Fields of the call-creation response used by the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallResponse {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub join_url: Option<String>,
}
