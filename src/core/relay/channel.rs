//! In-process handle to a remote audio channel.
//!
//! The actual WebSocket lives in a connection task owned by the provider
//! implementation. The relay session talks to that task through mpsc
//! channels, mirroring how the realtime clients split their socket into a
//! sink and a stream:
//!
//! ```text
//!   RelaySession ── ChannelSender ──(ChannelCommand)──▶ ChannelEndpoint ──▶ WebSocket
//!   RelaySession ◀─ ChannelReceiver ◀─(RemoteEvent)─── ChannelEndpoint ◀── WebSocket
//! ```
//!
//! Channel state is shared through an atomic so the session can check
//! readiness on every inbound chunk without awaiting.
//!
//! Commands are bounded and events are not: the session may wait on a full
//! command queue, the connection task never waits on the session.

use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::mpsc;

use super::base::{ChannelState, RelayError, RelayResult};

/// Default capacity of the command queue.
pub const CHANNEL_CAPACITY: usize = 256;

/// Event delivered by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// The WebSocket handshake completed
    Opened,
    /// Binary audio frame
    Audio(Bytes),
    /// Text frame carrying a control message
    Control(String),
    /// The remote side closed the connection
    Closed { reason: Option<String> },
    /// Transport failure; the channel is unusable afterwards
    Error(String),
}

/// Command sent to the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Forward a binary audio frame
    Audio(Bytes),
    /// Close the connection
    Close,
}

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    close_requested: AtomicBool,
}

impl Shared {
    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ChannelState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Apply a transport-side transition. `Closed` is terminal, and a close
    /// requested before the handshake finished keeps the channel closing.
    fn transition(&self, state: ChannelState) {
        if self.state() == ChannelState::Closed {
            return;
        }
        if state == ChannelState::Open && self.close_requested.load(Ordering::Acquire) {
            return;
        }
        self.set_state(state);
    }
}

/// Handle to an established remote channel.
#[derive(Debug)]
pub struct RemoteChannel {
    sender: ChannelSender,
    receiver: ChannelReceiver,
}

impl RemoteChannel {
    /// Create a channel handle and the transport endpoint that drives it.
    ///
    /// `capacity` bounds the command queue only.
    pub fn new(capacity: usize) -> (Self, ChannelEndpoint) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let channel = Self {
            sender: ChannelSender {
                commands: command_tx,
                shared: shared.clone(),
            },
            receiver: ChannelReceiver { events: event_rx },
        };
        let endpoint = ChannelEndpoint {
            commands: command_rx,
            events: EndpointEvents {
                events: event_tx,
                shared,
            },
        };
        (channel, endpoint)
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        self.sender.state()
    }

    /// Split into independently owned send and receive halves.
    pub fn split(self) -> (ChannelSender, ChannelReceiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half of a [`RemoteChannel`].
#[derive(Debug, Clone)]
pub struct ChannelSender {
    commands: mpsc::Sender<ChannelCommand>,
    shared: Arc<Shared>,
}

impl ChannelSender {
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Send one audio frame. Fails unless the channel is open.
    pub async fn send_audio(&self, audio: Bytes) -> RelayResult<()> {
        let state = self.state();
        if state != ChannelState::Open {
            return Err(RelayError::NotOpen(state));
        }
        self.commands
            .send(ChannelCommand::Audio(audio))
            .await
            .map_err(|_| RelayError::ChannelClosed)
    }

    /// Request the connection to close.
    ///
    /// Only the first call reaches the transport; later calls return
    /// `Ok(false)` without side effects.
    pub async fn close(&self) -> RelayResult<bool> {
        if self.shared.close_requested.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        if self.state() != ChannelState::Closed {
            self.shared.set_state(ChannelState::Closing);
        }
        self.commands
            .send(ChannelCommand::Close)
            .await
            .map_err(|_| RelayError::ChannelClosed)?;
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn close_requested(&self) -> bool {
        self.shared.close_requested.load(Ordering::Acquire)
    }
}

/// Receiving half of a [`RemoteChannel`].
#[derive(Debug)]
pub struct ChannelReceiver {
    events: mpsc::UnboundedReceiver<RemoteEvent>,
}

impl ChannelReceiver {
    /// Next event from the remote side. `None` once the connection task is gone.
    pub async fn recv(&mut self) -> Option<RemoteEvent> {
        self.events.recv().await
    }

    /// Next queued event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<RemoteEvent> {
        self.events.try_recv().ok()
    }

    /// Stop accepting events. Already queued events can still be received,
    /// later `emit` calls on the endpoint return false.
    pub fn close(&mut self) {
        self.events.close();
    }
}

/// Transport side of a [`RemoteChannel`], owned by the connection task.
#[derive(Debug)]
pub struct ChannelEndpoint {
    commands: mpsc::Receiver<ChannelCommand>,
    events: EndpointEvents,
}

impl ChannelEndpoint {
    pub fn state(&self) -> ChannelState {
        self.events.state()
    }

    /// Record a state transition. `Closed` is terminal and never overwritten.
    pub fn set_state(&self, state: ChannelState) {
        self.events.set_state(state);
    }

    /// Next command from the session. `None` once the session dropped its sender.
    pub async fn recv_command(&mut self) -> Option<ChannelCommand> {
        self.commands.recv().await
    }

    /// Deliver an event to the session without waiting. Returns false if the
    /// session is gone.
    pub fn emit(&self, event: RemoteEvent) -> bool {
        self.events.emit(event)
    }

    /// Split into the command queue and the event/state half, so a connection
    /// task can wait on commands while reporting events from another branch.
    pub fn split(self) -> (mpsc::Receiver<ChannelCommand>, EndpointEvents) {
        (self.commands, self.events)
    }
}

/// Event-reporting half of a [`ChannelEndpoint`].
#[derive(Debug, Clone)]
pub struct EndpointEvents {
    events: mpsc::UnboundedSender<RemoteEvent>,
    shared: Arc<Shared>,
}

impl EndpointEvents {
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn set_state(&self, state: ChannelState) {
        self.shared.transition(state);
    }

    pub fn emit(&self, event: RemoteEvent) -> bool {
        self.events.send(event).is_ok()
    }
}
