//! Outbound audio pacing.
//!
//! Remote encoders tend to emit many small binary frames. Writing each one to
//! the HTTP response individually amplifies jitter downstream, so frames are
//! accumulated in a pending buffer and released once both a minimum elapsed
//! time and a minimum size have been reached.
//!
//! The window timer starts at the first frame of the session and is never
//! reset. After the first [`PACING_WINDOW`] of a call the time condition stays
//! satisfied and only the size condition gates flushes.

use bytes::{Bytes, BytesMut};
use tokio::time::{Duration, Instant};

/// Minimum time since the window-opening frame before a flush.
pub const PACING_WINDOW: Duration = Duration::from_millis(100);

/// Minimum pending size before a flush: one 20 ms frame of 16-bit 8 kHz PCM.
pub const MIN_FLUSH_BYTES: usize = 320;

/// Accumulates remote audio frames and decides when to release them.
///
/// Owned by a single relay session task; appends and flushes never
/// interleave, so the buffer needs no lock.
#[derive(Debug)]
pub struct OutboundPacer {
    pending: BytesMut,
    window_started: Option<Instant>,
    window: Duration,
    min_bytes: usize,
    bytes_in: u64,
    bytes_flushed: u64,
}

impl Default for OutboundPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundPacer {
    pub fn new() -> Self {
        Self {
            pending: BytesMut::new(),
            window_started: None,
            window: PACING_WINDOW,
            min_bytes: MIN_FLUSH_BYTES,
            bytes_in: 0,
            bytes_flushed: 0,
        }
    }

    /// Append a frame; returns the flushed bytes if this frame completed a chunk.
    pub fn on_frame(&mut self, frame: &[u8]) -> Option<Bytes> {
        self.on_frame_at(frame, Instant::now())
    }

    fn on_frame_at(&mut self, frame: &[u8], now: Instant) -> Option<Bytes> {
        if self.window_started.is_none() {
            tracing::debug!("First remote audio frame received, starting pacing window");
            self.window_started = Some(now);
        }

        self.pending.extend_from_slice(frame);
        self.bytes_in += frame.len() as u64;

        if self.should_flush_at(now) {
            Some(self.flush())
        } else {
            None
        }
    }

    /// True once a window is open, it has lasted at least [`PACING_WINDOW`],
    /// and at least [`MIN_FLUSH_BYTES`] are pending.
    pub fn should_flush(&self) -> bool {
        self.should_flush_at(Instant::now())
    }

    fn should_flush_at(&self, now: Instant) -> bool {
        let Some(started) = self.window_started else {
            return false;
        };
        now.saturating_duration_since(started) >= self.window && self.pending.len() >= self.min_bytes
    }

    /// Take everything pending, leaving the buffer empty.
    pub fn flush(&mut self) -> Bytes {
        let chunk = self.pending.split().freeze();
        self.bytes_flushed += chunk.len() as u64;
        chunk
    }

    /// Drop whatever is pending and return how many bytes were lost.
    pub fn discard(&mut self) -> usize {
        let len = self.pending.len();
        self.pending.clear();
        len
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_flushed(&self) -> u64 {
        self.bytes_flushed
    }

    pub fn window_started(&self) -> Option<Instant> {
        self.window_started
    }
}
