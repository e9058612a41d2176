pub mod relay;
pub mod ultravox;

// Re-export commonly used types for convenience
pub use relay::{
    ChannelState, ControlInterpreter, OutboundPacer, RelayError, RelayResult, RelaySession,
    RemoteChannel, SessionInitiator, SessionState, SessionSummary,
};
pub use ultravox::UltravoxInitiator;
