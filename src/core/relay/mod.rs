//! Bidirectional audio relay between a streamed HTTP exchange and a remote
//! conversational-AI channel.
//!
//! # Architecture
//!
//! - [`SessionInitiator`] abstracts the provider handshake and yields a
//!   [`RemoteChannel`]
//! - [`RelaySession`] owns the per-call state machine and runs on one task
//! - [`OutboundPacer`] batches remote audio before it reaches the client
//! - [`ControlInterpreter`] logs the provider's text control messages
//!
//! # Audio Format
//!
//! Audio is forwarded opaquely in both directions. The provider is asked for
//! 8 kHz input and output; see [`MIN_FLUSH_BYTES`] for the flush size this
//! implies.

mod base;
mod channel;
mod control;
mod pacer;
mod session;

pub use base::{
    ChannelState, RelayError, RelayResult, SessionInitiator, SessionState, SessionSummary,
};
pub use channel::{
    CHANNEL_CAPACITY, ChannelCommand, ChannelEndpoint, ChannelReceiver, ChannelSender,
    EndpointEvents, RemoteChannel, RemoteEvent,
};
pub use control::{ControlInterpreter, ControlMessage, ControlParseError, Observation, Transcript};
pub use pacer::{MIN_FLUSH_BYTES, OutboundPacer, PACING_WINDOW};
pub use session::RelaySession;
