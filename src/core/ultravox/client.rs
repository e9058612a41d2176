//! Ultravox session initiator.
//!
//! Creating a session takes two steps:
//!
//! 1. `POST` the call definition to the REST API and read `joinUrl`
//! 2. Open a WebSocket to `joinUrl` on a spawned connection task
//!
//! [`SessionInitiator::initiate`] returns after step 1. The channel starts in
//! `Connecting` and becomes `Open` once the handshake completes, so audio the
//! session receives in between is dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{CreateCallRequest, CreateCallResponse};
use crate::config::{CallType, UltravoxConfig};
use crate::core::relay::{
    CHANNEL_CAPACITY, ChannelCommand, ChannelEndpoint, ChannelState, EndpointEvents, RelayError,
    RelayResult, RemoteChannel, RemoteEvent, SessionInitiator,
};

/// Timeout for the call-creation request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the remote close frame after requesting a close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates Ultravox calls and connects their WebSocket medium.
pub struct UltravoxInitiator {
    config: UltravoxConfig,
    client: reqwest::Client,
}

impl UltravoxInitiator {
    pub fn new(config: UltravoxConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                RelayError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    /// Call-creation endpoint for the configured call type.
    pub fn calls_url(&self) -> RelayResult<String> {
        let base = self.config.api_base_url.trim_end_matches('/');
        match self.config.call_type {
            CallType::Agent => {
                let agent_id = self.config.agent_id.as_deref().ok_or_else(|| {
                    RelayError::InvalidConfiguration(
                        "agent calls require an agent id".to_string(),
                    )
                })?;
                Ok(format!("{base}/agents/{agent_id}/calls"))
            }
            CallType::Generic => Ok(format!("{base}/calls")),
        }
    }

    /// Create a call and return its WebSocket join URL.
    pub async fn create_call(&self, call_id: &str) -> RelayResult<String> {
        let url = self.calls_url()?;
        let request = CreateCallRequest::new(&self.config, call_id);

        info!(
            call_id = %call_id,
            call_type = %self.config.call_type,
            url = %url,
            client_buffer_size_ms = self.config.client_buffer_size_ms,
            "Connecting to Ultravox API"
        );
        debug!(call_id = %call_id, body = ?request, "Ultravox create call request");

        let response = self
            .client
            .post(&url)
            .header("X-API-Key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::InitiationFailed(format!(
                "Ultravox API error ({status}): {error_body}"
            )));
        }

        let body: CreateCallResponse = response.json().await?;
        debug!(
            call_id = %call_id,
            remote_call_id = body.call_id.as_deref().unwrap_or("unknown"),
            "Ultravox call created"
        );

        body.join_url
            .filter(|url| !url.is_empty())
            .ok_or(RelayError::MissingJoinUrl)
    }
}

#[async_trait]
impl SessionInitiator for UltravoxInitiator {
    async fn initiate(&self, call_id: &str) -> RelayResult<RemoteChannel> {
        let join_url = self.create_call(call_id).await?;

        let (channel, endpoint) = RemoteChannel::new(CHANNEL_CAPACITY);
        tokio::spawn(run_connection(join_url, endpoint, call_id.to_string()));

        Ok(channel)
    }

    fn provider_name(&self) -> &'static str {
        "ultravox"
    }
}

/// Own the WebSocket for one call until either side closes it.
async fn run_connection(join_url: String, endpoint: ChannelEndpoint, call_id: String) {
    let (mut commands, events) = endpoint.split();

    let ws_stream = match tokio_tungstenite::connect_async(join_url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            error!(call_id = %call_id, error = %e, "Failed to connect to Ultravox WebSocket");
            events.set_state(ChannelState::Closed);
            events.emit(RemoteEvent::Error(
                RelayError::WebSocketError(e.to_string()).to_string(),
            ));
            return;
        }
    };

    events.set_state(ChannelState::Open);
    if !events.emit(RemoteEvent::Opened) {
        debug!(call_id = %call_id, "Session ended before WebSocket opened");
    }

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut commands_open = true;
    let mut close_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            // Outgoing audio and close requests from the session
            command = commands.recv(), if commands_open => match command {
                Some(ChannelCommand::Audio(data)) => {
                    if let Err(e) = ws_sink.send(Message::Binary(data)).await {
                        error!(call_id = %call_id, error = %e, "Failed to send audio to Ultravox");
                        emit_terminal(&events, RemoteEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(ChannelCommand::Close) => {
                    commands_open = false;
                    events.set_state(ChannelState::Closing);
                    if let Err(e) = ws_sink.send(Message::Close(None)).await {
                        debug!(call_id = %call_id, error = %e, "Failed to send close frame");
                        emit_terminal(&events, RemoteEvent::Closed { reason: None });
                        break;
                    }
                    close_deadline = Some(Instant::now() + CLOSE_TIMEOUT);
                }
                None => {
                    // Session is gone; nobody is left to report to
                    debug!(call_id = %call_id, "Session dropped, closing Ultravox WebSocket");
                    let _ = ws_sink.close().await;
                    break;
                }
            },

            // Incoming audio and control messages
            message = ws_stream.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    if !events.emit(RemoteEvent::Audio(data)) {
                        debug!(call_id = %call_id, "Session dropped, closing Ultravox WebSocket");
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    events.emit(RemoteEvent::Control(text.as_str().to_owned()));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                        warn!(call_id = %call_id, error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                    info!(call_id = %call_id, "WebSocket closed by Ultravox");
                    // Flushes the close reply
                    let _ = ws_sink.close().await;
                    emit_terminal(&events, RemoteEvent::Closed { reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(call_id = %call_id, error = %e, "Ultravox WebSocket error");
                    emit_terminal(&events, RemoteEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    emit_terminal(&events, RemoteEvent::Closed { reason: None });
                    break;
                }
            },

            _ = sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                warn!(call_id = %call_id, "Timed out waiting for Ultravox close frame");
                emit_terminal(
                    &events,
                    RemoteEvent::Closed { reason: Some("close timeout".to_string()) },
                );
                break;
            }
        }
    }

    events.set_state(ChannelState::Closed);
}

fn emit_terminal(events: &EndpointEvents, event: RemoteEvent) {
    events.set_state(ChannelState::Closed);
    events.emit(event);
}
