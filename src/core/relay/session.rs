//! Relay session lifecycle.
//!
//! One session couples one inbound HTTP audio stream, one remote channel and
//! one outbound HTTP audio stream for the lifetime of a call:
//!
//! ```text
//!   inbound body ──(unbuffered)──▶ remote channel
//!   remote channel ──binary──▶ OutboundPacer ──▶ outbound body
//!   remote channel ──text────▶ ControlInterpreter (log only)
//! ```
//!
//! States: `Connecting → Open → Closing → Closed`. Whichever side finishes
//! first drives the other down: the end of the inbound stream closes the
//! remote channel, and the remote channel closing ends the outbound stream.
//! Everything runs on a single task, so the pacer buffer is never shared.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{RelayResult, SessionInitiator, SessionState, SessionSummary};
use super::channel::{ChannelReceiver, ChannelSender, RemoteChannel, RemoteEvent};
use super::control::{ControlInterpreter, Observation};
use super::pacer::OutboundPacer;

/// Why the session loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Termination {
    RemoteClosed(Option<String>),
    RemoteError(String),
    RemoteGone,
    Cancelled,
}

/// State for one relayed call.
pub struct RelaySession {
    call_id: String,
    state: SessionState,
    channel: Option<RemoteChannel>,
    pacer: OutboundPacer,
    interpreter: ControlInterpreter,
    cancel: CancellationToken,
    summary: SessionSummary,
}

impl RelaySession {
    /// Ask the initiator for a remote channel and build an open session.
    ///
    /// Initiation failures are returned to the caller; no streams have been
    /// touched at that point.
    pub async fn connect(
        initiator: &dyn SessionInitiator,
        call_id: impl Into<String>,
    ) -> RelayResult<Self> {
        let call_id = call_id.into();
        info!(
            call_id = %call_id,
            provider = initiator.provider_name(),
            "Relay session connecting"
        );

        match initiator.initiate(&call_id).await {
            Ok(channel) => Ok(Self::new(call_id, channel)),
            Err(e) => {
                error!(call_id = %call_id, error = %e, "Session initiation failed");
                Err(e)
            }
        }
    }

    /// Build an open session around an already-established channel.
    pub fn new(call_id: impl Into<String>, channel: RemoteChannel) -> Self {
        let call_id = call_id.into();
        Self {
            interpreter: ControlInterpreter::new(call_id.clone()),
            call_id,
            state: SessionState::Open,
            channel: Some(channel),
            pacer: OutboundPacer::new(),
            cancel: CancellationToken::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that aborts the session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replace the session's token, typically with a child of a server-wide one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the session on its own task.
    pub fn spawn<S, E>(self, inbound: S, outbound: mpsc::Sender<Bytes>) -> JoinHandle<SessionSummary>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        tokio::spawn(self.run(inbound, outbound))
    }

    /// Drive the session until the remote channel closes or the session is
    /// cancelled. Dropping `outbound` on return ends the client response.
    pub async fn run<S, E>(mut self, inbound: S, outbound: mpsc::Sender<Bytes>) -> SessionSummary
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        let Some(channel) = self.channel.take() else {
            warn!(call_id = %self.call_id, "Relay session has no remote channel");
            return self.summary;
        };
        let (sender, mut receiver) = channel.split();
        let cancel = self.cancel.clone();
        let mut outbound = Some(outbound);
        let mut inbound_done = false;
        tokio::pin!(inbound);

        info!(call_id = %self.call_id, "Relay session open");

        let termination = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break Termination::Cancelled;
                }

                chunk = inbound.next(), if !inbound_done => match chunk {
                    Some(Ok(data)) => self.forward_inbound(&sender, data).await,
                    Some(Err(e)) => {
                        error!(call_id = %self.call_id, error = %e, "Request error");
                        inbound_done = true;
                        self.close_remote(&sender).await;
                    }
                    None => {
                        info!(call_id = %self.call_id, "Request stream ended");
                        inbound_done = true;
                        self.close_remote(&sender).await;
                    }
                },

                event = receiver.recv() => {
                    if let Some(termination) = self
                        .handle_remote_event(event, &sender, &mut outbound)
                        .await
                    {
                        break termination;
                    }
                }
            }
        };

        self.finish(termination, &sender, &mut receiver, outbound.take())
            .await
    }

    /// Forward one inbound chunk, dropping it unless the channel is open.
    async fn forward_inbound(&mut self, sender: &ChannelSender, data: Bytes) {
        let len = data.len() as u64;
        if !sender.is_open() {
            debug!(
                call_id = %self.call_id,
                bytes = len,
                state = %sender.state(),
                "Remote channel not open, dropping inbound audio"
            );
            self.summary.bytes_dropped += len;
            return;
        }

        match sender.send_audio(data).await {
            Ok(()) => self.summary.bytes_forwarded += len,
            Err(e) => {
                debug!(call_id = %self.call_id, error = %e, "Dropping inbound audio");
                self.summary.bytes_dropped += len;
            }
        }
    }

    /// Returns a termination reason when the event ends the session.
    async fn handle_remote_event(
        &mut self,
        event: Option<RemoteEvent>,
        sender: &ChannelSender,
        outbound: &mut Option<mpsc::Sender<Bytes>>,
    ) -> Option<Termination> {
        match event {
            Some(RemoteEvent::Opened) => {
                info!(call_id = %self.call_id, "WebSocket connected to remote");
                None
            }
            Some(RemoteEvent::Audio(frame)) => {
                self.summary.frames_received += 1;
                self.summary.bytes_received += frame.len() as u64;
                if let Some(chunk) = self.pacer.on_frame(&frame) {
                    self.write_outbound(chunk, sender, outbound).await;
                }
                None
            }
            Some(RemoteEvent::Control(text)) => {
                if let Observation::Malformed(_) = self.interpreter.interpret(&text) {
                    debug!(call_id = %self.call_id, "Continuing after malformed control message");
                }
                None
            }
            Some(RemoteEvent::Closed { reason }) => Some(Termination::RemoteClosed(reason)),
            Some(RemoteEvent::Error(e)) => Some(Termination::RemoteError(e)),
            None => Some(Termination::RemoteGone),
        }
    }

    async fn write_outbound(
        &mut self,
        chunk: Bytes,
        sender: &ChannelSender,
        outbound: &mut Option<mpsc::Sender<Bytes>>,
    ) {
        let len = chunk.len() as u64;
        let Some(tx) = outbound.as_ref() else {
            self.summary.bytes_discarded += len;
            return;
        };

        if tx.send(chunk).await.is_ok() {
            self.summary.bytes_flushed += len;
            return;
        }

        warn!(call_id = %self.call_id, "Client stopped reading the response, closing session");
        self.summary.bytes_discarded += len;
        *outbound = None;
        self.close_remote(sender).await;
    }

    /// Request the remote side to close. Safe to call repeatedly.
    async fn close_remote(&mut self, sender: &ChannelSender) {
        self.transition(SessionState::Closing);
        match sender.close().await {
            Ok(true) => debug!(call_id = %self.call_id, "Close requested on remote channel"),
            Ok(false) => {}
            Err(e) => debug!(call_id = %self.call_id, error = %e, "Remote channel already gone"),
        }
    }

    async fn finish(
        mut self,
        termination: Termination,
        sender: &ChannelSender,
        receiver: &mut ChannelReceiver,
        outbound: Option<mpsc::Sender<Bytes>>,
    ) -> SessionSummary {
        match &termination {
            Termination::RemoteClosed(reason) => info!(
                call_id = %self.call_id,
                reason = reason.as_deref().unwrap_or(""),
                "WebSocket connection closed"
            ),
            Termination::RemoteError(e) => {
                error!(call_id = %self.call_id, error = %e, "WebSocket error")
            }
            Termination::RemoteGone => {
                warn!(call_id = %self.call_id, "Remote channel ended without a close event")
            }
            Termination::Cancelled => {
                info!(call_id = %self.call_id, "Relay session cancelled");
                self.close_remote(sender).await;
            }
        }

        self.transition(SessionState::Closing);
        // Ends the client response
        drop(outbound);

        let residual = self.pacer.discard();
        if residual > 0 {
            debug!(
                call_id = %self.call_id,
                bytes = residual,
                "Discarding unflushed remote audio"
            );
        }
        self.summary.bytes_discarded += residual as u64;
        self.summary.control_messages = self.interpreter.messages();
        self.summary.malformed_messages = self.interpreter.malformed();

        // Refuse further events, then count the audio still queued
        receiver.close();
        while let Some(event) = receiver.try_recv() {
            if let RemoteEvent::Audio(frame) = event {
                self.summary.bytes_discarded += frame.len() as u64;
            }
        }

        self.transition(SessionState::Closed);
        info!(
            call_id = %self.call_id,
            remote_call_id = self.interpreter.remote_call_id().unwrap_or("unknown"),
            last_state = self.interpreter.last_state().unwrap_or("none"),
            bytes_forwarded = self.summary.bytes_forwarded,
            bytes_flushed = self.summary.bytes_flushed,
            bytes_discarded = self.summary.bytes_discarded,
            "Relay session closed"
        );
        self.summary
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next || self.state == SessionState::Closed {
            return;
        }
        debug!(call_id = %self.call_id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::base::{ChannelState, RelayError};
    use crate::core::relay::channel::{ChannelCommand, ChannelEndpoint};
    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use std::io;
    use tokio::time::{Duration, sleep};

    type Inbound = fmpsc::UnboundedSender<Result<Bytes, io::Error>>;

    struct Harness {
        inbound: Inbound,
        endpoint: ChannelEndpoint,
        outbound: mpsc::Receiver<Bytes>,
        handle: JoinHandle<SessionSummary>,
        cancel: CancellationToken,
    }

    fn start(open: bool) -> Harness {
        start_with_capacity(open, 64)
    }

    fn start_with_capacity(open: bool, capacity: usize) -> Harness {
        let (channel, endpoint) = RemoteChannel::new(capacity);
        if open {
            endpoint.set_state(ChannelState::Open);
        }
        let (inbound_tx, inbound_rx) = fmpsc::unbounded();
        let (outbound_tx, outbound_rx) = mpsc::channel(64);

        let session = RelaySession::new("abc-123", channel);
        let cancel = session.cancellation_token();
        let handle = session.spawn(inbound_rx, outbound_tx);

        Harness {
            inbound: inbound_tx,
            endpoint,
            outbound: outbound_rx,
            handle,
            cancel,
        }
    }

    async fn collect_commands(endpoint: &mut ChannelEndpoint) -> Vec<ChannelCommand> {
        let mut commands = Vec::new();
        while let Some(command) = endpoint.recv_command().await {
            commands.push(command);
        }
        commands
    }

    #[tokio::test]
    async fn test_inbound_audio_is_forwarded_unmodified() {
        let mut h = start(true);
        let audio: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();

        h.inbound
            .unbounded_send(Ok(Bytes::copy_from_slice(&audio[..120])))
            .unwrap();
        h.inbound
            .unbounded_send(Ok(Bytes::copy_from_slice(&audio[120..])))
            .unwrap();
        h.inbound.close_channel();

        assert_eq!(
            h.endpoint.recv_command().await,
            Some(ChannelCommand::Audio(Bytes::copy_from_slice(&audio[..120])))
        );
        assert_eq!(
            h.endpoint.recv_command().await,
            Some(ChannelCommand::Audio(Bytes::copy_from_slice(&audio[120..])))
        );
        assert_eq!(h.endpoint.recv_command().await, Some(ChannelCommand::Close));

        h.endpoint.emit(RemoteEvent::Closed { reason: None });
        let summary = h.handle.await.unwrap();
        assert_eq!(summary.bytes_forwarded, 500);
        assert_eq!(summary.bytes_dropped, 0);
        assert_eq!(h.outbound.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_dropped_while_channel_not_open() {
        let mut h = start(false);

        h.inbound
            .unbounded_send(Ok(Bytes::from(vec![1u8; 200])))
            .unwrap();
        sleep(Duration::from_millis(10)).await;

        h.endpoint.set_state(ChannelState::Open);
        h.inbound
            .unbounded_send(Ok(Bytes::from(vec![2u8; 50])))
            .unwrap();
        h.inbound.close_channel();

        assert_eq!(
            h.endpoint.recv_command().await,
            Some(ChannelCommand::Audio(Bytes::from(vec![2u8; 50])))
        );
        assert_eq!(h.endpoint.recv_command().await, Some(ChannelCommand::Close));

        h.endpoint.emit(RemoteEvent::Closed { reason: None });
        let summary = h.handle.await.unwrap();
        assert_eq!(summary.bytes_dropped, 200);
        assert_eq!(summary.bytes_forwarded, 50);
    }

    #[tokio::test]
    async fn test_remote_close_requested_once_on_repeated_errors() {
        let mut h = start(true);

        h.inbound
            .unbounded_send(Err(io::Error::other("reset")))
            .unwrap();
        h.inbound
            .unbounded_send(Err(io::Error::other("reset again")))
            .unwrap();
        h.inbound.close_channel();

        assert_eq!(h.endpoint.recv_command().await, Some(ChannelCommand::Close));
        h.endpoint.emit(RemoteEvent::Closed { reason: None });
        h.handle.await.unwrap();

        let remaining = collect_commands(&mut h.endpoint).await;
        assert!(remaining.is_empty(), "unexpected commands: {remaining:?}");
    }

    #[tokio::test]
    async fn test_two_way_traffic_survives_a_full_command_queue() {
        let mut h = start_with_capacity(true, 4);

        for i in 0..20u8 {
            h.inbound.unbounded_send(Ok(Bytes::from(vec![i; 32]))).unwrap();
        }
        // The session is now parked on the full command queue; the remote
        // side keeps delivering regardless
        for _ in 0..500 {
            assert!(h.endpoint.emit(RemoteEvent::Audio(Bytes::from(vec![9u8; 32]))));
        }

        for i in 0..20u8 {
            assert_eq!(
                h.endpoint.recv_command().await,
                Some(ChannelCommand::Audio(Bytes::from(vec![i; 32])))
            );
        }

        h.endpoint.emit(RemoteEvent::Closed { reason: None });
        let summary = h.handle.await.unwrap();
        assert_eq!(summary.bytes_forwarded, 20 * 32);
        assert_eq!(summary.frames_received, 500);
        assert_eq!(summary.bytes_received, 500 * 32);
        drop(h.inbound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_control_message_does_not_end_session() {
        let mut h = start(true);

        h.endpoint.emit(RemoteEvent::Control("{not json".to_string()));
        h.endpoint.emit(RemoteEvent::Audio(Bytes::from(vec![7u8; 400])));
        sleep(Duration::from_millis(150)).await;
        h.endpoint.emit(RemoteEvent::Audio(Bytes::from(vec![8u8; 100])));

        let chunk = h.outbound.recv().await.unwrap();
        assert_eq!(chunk.len(), 500);
        assert_eq!(&chunk[..400], &[7u8; 400][..]);
        assert_eq!(&chunk[400..], &[8u8; 100][..]);

        h.endpoint.emit(RemoteEvent::Closed { reason: None });
        let summary = h.handle.await.unwrap();
        assert_eq!(summary.malformed_messages, 1);
        assert_eq!(summary.control_messages, 1);
        assert_eq!(summary.bytes_flushed, 500);
        assert_eq!(h.outbound.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_ends_outbound_and_discards_residual() {
        let mut h = start(true);

        h.endpoint.emit(RemoteEvent::Audio(Bytes::from(vec![1u8; 100])));
        h.endpoint.emit(RemoteEvent::Control(
            r#"{"type":"error","message":"boom"}"#.to_string(),
        ));
        h.endpoint.emit(RemoteEvent::Closed {
            reason: Some("done".to_string()),
        });

        assert_eq!(h.outbound.recv().await, None);
        let summary = h.handle.await.unwrap();
        assert_eq!(summary.frames_received, 1);
        assert_eq!(summary.bytes_received, 100);
        assert_eq!(summary.bytes_flushed, 0);
        assert_eq!(summary.bytes_discarded, 100);
        assert_eq!(summary.control_messages, 1);
    }

    #[tokio::test]
    async fn test_remote_error_ends_session() {
        let mut h = start(true);
        h.endpoint.emit(RemoteEvent::Error("connection reset".to_string()));

        assert_eq!(h.outbound.recv().await, None);
        h.handle.await.unwrap();
        drop(h.inbound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_gone_closes_remote() {
        let mut h = start(true);
        drop(h.outbound);

        h.endpoint.emit(RemoteEvent::Audio(Bytes::from(vec![0u8; 400])));
        sleep(Duration::from_millis(150)).await;
        h.endpoint.emit(RemoteEvent::Audio(Bytes::from(vec![0u8; 100])));

        assert_eq!(h.endpoint.recv_command().await, Some(ChannelCommand::Close));
        h.endpoint.emit(RemoteEvent::Closed { reason: None });

        let summary = h.handle.await.unwrap();
        assert_eq!(summary.bytes_flushed, 0);
        assert_eq!(summary.bytes_discarded, 500);
    }

    #[tokio::test]
    async fn test_cancellation_closes_remote() {
        let mut h = start(true);
        h.cancel.cancel();

        assert_eq!(h.endpoint.recv_command().await, Some(ChannelCommand::Close));
        h.handle.await.unwrap();
        assert_eq!(h.outbound.recv().await, None);
    }

    struct FailingInitiator;

    #[async_trait]
    impl SessionInitiator for FailingInitiator {
        async fn initiate(&self, _call_id: &str) -> RelayResult<RemoteChannel> {
            Err(RelayError::MissingJoinUrl)
        }

        fn provider_name(&self) -> &'static str {
            "failing"
        }
    }

    struct OpenInitiator;

    #[async_trait]
    impl SessionInitiator for OpenInitiator {
        async fn initiate(&self, _call_id: &str) -> RelayResult<RemoteChannel> {
            let (channel, endpoint) = RemoteChannel::new(4);
            endpoint.set_state(ChannelState::Open);
            Ok(channel)
        }

        fn provider_name(&self) -> &'static str {
            "open"
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let result = RelaySession::connect(&FailingInitiator, "abc-123").await;
        assert!(matches!(result, Err(RelayError::MissingJoinUrl)));
    }

    #[tokio::test]
    async fn test_connect_success_opens_session() {
        let session = RelaySession::connect(&OpenInitiator, "abc-123")
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.call_id(), "abc-123");
    }
}
