//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `speech` - Streaming speech-to-speech relay

pub mod api;
pub mod speech;

// Re-export commonly used handlers for convenient access
pub use speech::speech_to_speech_stream;
