//! Speech-to-speech route configuration
//!
//! # Endpoint
//!
//! `POST /speech-to-speech-stream`
//!
//! - Header `x-uuid`: call id forwarded to the provider as metadata
//! - Request body: raw caller audio, streamed (16-bit PCM, 8 kHz, mono)
//! - Response body: raw agent audio, streamed as `application/octet-stream`

use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::speech::speech_to_speech_stream;
use crate::state::AppState;
use std::sync::Arc;

/// Path of the streaming relay endpoint
pub const SPEECH_STREAM_PATH: &str = "/speech-to-speech-stream";

/// Create the speech relay router
pub fn create_speech_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(SPEECH_STREAM_PATH, post(speech_to_speech_stream))
        .layer(TraceLayer::new_for_http())
}
