//! Streaming speech-to-speech handler.
//!
//! `POST /speech-to-speech-stream` keeps both directions open for the length
//! of a call: the request body is the caller's audio and the chunked response
//! body is the agent's audio. The call is identified by the `x-uuid` header.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::relay::RelaySession;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Header carrying the caller-assigned call id.
pub const CALL_ID_HEADER: &str = "x-uuid";

/// Flushed chunks queued for the client before the session waits.
const OUTBOUND_CAPACITY: usize = 64;

/// Relay one call between the HTTP exchange and the speech provider.
///
/// Returns 400 without `x-uuid` and 502 when the provider call cannot be
/// created. Otherwise responds 200 immediately and streams audio until the
/// provider closes the call.
pub async fn speech_to_speech_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> AppResult<Response> {
    let call_id = headers
        .get(CALL_ID_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .ok_or_else(|| AppError::BadRequest(format!("missing {CALL_ID_HEADER} header")))?;

    info!(call_id = %call_id, "Received UUID");

    let session = RelaySession::connect(state.initiator.as_ref(), call_id)
        .await?
        .with_cancellation(state.shutdown.child_token());

    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_CAPACITY);
    session.spawn(body.into_data_stream(), outbound_tx);

    let stream = futures::stream::unfold(outbound_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build response: {e}")))
}
