//! Ultravox provider module.
//!
//! Ultravox exposes a speech-to-speech agent over a "server WebSocket"
//! medium: a call is created over REST and the returned `joinUrl` carries raw
//! PCM audio as binary frames and JSON control messages as text frames.
//!
//! # API Reference
//!
//! - Agent calls: `POST {base}/agents/{agent_id}/calls`
//! - Generic calls: `POST {base}/calls`
//! - Authentication: `X-API-Key` header
//! - Audio: 16-bit PCM at 8 kHz in both directions

mod client;
mod messages;

pub use client::UltravoxInitiator;
pub use messages::{
    CallMedium, CallMetadata, CartesiaVoice, CreateCallRequest, CreateCallResponse,
    ElevenLabsVoice, ExternalVoicePayload, GenericVoice, LmntVoice, ServerWebSocketMedium,
    ULTRAVOX_SAMPLE_RATE,
};
