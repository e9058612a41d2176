//! Base traits and types for the audio relay.
//!
//! A relay session couples one streamed HTTP request/response pair with one
//! remote conversational-AI channel. The remote side is reached through a
//! [`SessionInitiator`], which hands back a [`RemoteChannel`] once the provider
//! has accepted the call.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use super::channel::RemoteChannel;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while setting up or running a relay session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The provider rejected the call setup request
    #[error("Session initiation failed: {0}")]
    InitiationFailed(String),

    /// The provider accepted the call but returned no join URL
    #[error("Provider response did not include a join URL")]
    MissingJoinUrl,

    /// HTTP request to the provider API failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// WebSocket error on the remote channel
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The remote channel is not open
    #[error("Remote channel is not open (state: {0})")]
    NotOpen(ChannelState),

    /// The remote channel task has gone away
    #[error("Remote channel closed")]
    ChannelClosed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::SerializationError(err.to_string())
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// States
// =============================================================================

/// Connection state of the remote channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Join URL obtained, WebSocket handshake in progress
    #[default]
    Connecting,
    /// Handshake complete, audio may be sent
    Open,
    /// Close requested, waiting for the remote side
    Closing,
    /// Connection finished
    Closed,
}

impl ChannelState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ChannelState::Connecting => 0,
            ChannelState::Open => 1,
            ChannelState::Closing => 2,
            ChannelState::Closed => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Connecting,
            1 => ChannelState::Open,
            2 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Connecting => write!(f, "Connecting"),
            ChannelState::Open => write!(f, "Open"),
            ChannelState::Closing => write!(f, "Closing"),
            ChannelState::Closed => write!(f, "Closed"),
        }
    }
}

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the session initiator
    #[default]
    Connecting,
    /// Both transports wired
    Open,
    /// One side finished, tearing down the other
    Closing,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Session Initiator
// =============================================================================

/// Opens a remote audio channel for a call.
///
/// Implementations perform whatever provider-specific handshake is needed
/// (REST call creation, join URL exchange) and return a channel whose
/// WebSocket may still be connecting. The relay does not wire any streams
/// until this resolves.
#[async_trait]
pub trait SessionInitiator: Send + Sync {
    /// Open a remote channel correlated with `call_id`.
    async fn initiate(&self, call_id: &str) -> RelayResult<RemoteChannel>;

    /// Provider name used in logs.
    fn provider_name(&self) -> &'static str;
}

/// Counters reported when a relay session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Inbound bytes forwarded to the remote channel
    pub bytes_forwarded: u64,
    /// Inbound bytes dropped because the channel was not open
    pub bytes_dropped: u64,
    /// Binary frames received from the remote channel
    pub frames_received: u64,
    /// Bytes received in those frames
    pub bytes_received: u64,
    /// Bytes written to the outbound stream
    pub bytes_flushed: u64,
    /// Pending bytes discarded at close
    pub bytes_discarded: u64,
    /// Text control messages seen
    pub control_messages: u64,
    /// Control messages that failed to parse
    pub malformed_messages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_round_trips_through_u8() {
        for state in [
            ChannelState::Connecting,
            ChannelState::Open,
            ChannelState::Closing,
            ChannelState::Closed,
        ] {
            assert_eq!(ChannelState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ChannelState::from_u8(42), ChannelState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ChannelState::Open.to_string(), "Open");
        assert_eq!(SessionState::Closing.to_string(), "Closing");
    }

    #[test]
    fn test_not_open_error_message() {
        let err = RelayError::NotOpen(ChannelState::Connecting);
        assert_eq!(
            err.to_string(),
            "Remote channel is not open (state: Connecting)"
        );
    }
}
