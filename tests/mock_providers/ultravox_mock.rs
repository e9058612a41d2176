//! Scripted WebSocket server standing in for an Ultravox call medium
//!
//! Accepts a single connection, plays its script, then records every binary
//! frame the gateway sends until the gateway closes the socket.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// One step the mock performs right after the gateway connects
#[derive(Debug, Clone)]
pub enum Step {
    /// Send agent audio
    Audio(Bytes),
    /// Send a control message
    Text(String),
    Sleep(Duration),
    /// Close the call from the provider side
    Close,
}

/// What the mock observed over the lifetime of the connection
#[derive(Debug, Default)]
pub struct MockReport {
    pub frames: Vec<Bytes>,
    pub client_closed: bool,
}

impl MockReport {
    pub fn audio(&self) -> Vec<u8> {
        self.frames.iter().flat_map(|f| f.iter().copied()).collect()
    }
}

pub struct MockUltravoxSocket {
    /// `ws://` URL to hand out as the call's join URL
    pub url: String,
    /// Signalled once the WebSocket handshake completes
    pub connected: Arc<Notify>,
    /// Binary frames as they arrive from the gateway
    pub frames: mpsc::UnboundedReceiver<Bytes>,
    report: oneshot::Receiver<MockReport>,
}

impl MockUltravoxSocket {
    pub async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock websocket listener");
        let addr = listener.local_addr().expect("mock listener address");

        let connected = Arc::new(Notify::new());
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (report_tx, report) = oneshot::channel();

        let notify = connected.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = accept_async(stream).await else {
                return;
            };
            notify.notify_one();

            let mut report = MockReport::default();

            for step in script {
                let sent = match step {
                    Step::Audio(data) => ws.send(Message::Binary(data)).await,
                    Step::Text(text) => ws.send(Message::Text(text.into())).await,
                    Step::Sleep(duration) => {
                        tokio::time::sleep(duration).await;
                        Ok(())
                    }
                    Step::Close => ws.close(None).await,
                };
                if sent.is_err() {
                    break;
                }
            }

            while let Some(message) = ws.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        let _ = frame_tx.send(data.clone());
                        report.frames.push(data);
                    }
                    Ok(Message::Close(_)) => {
                        report.client_closed = true;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            let _ = report_tx.send(report);
        });

        Self {
            url: format!("ws://{addr}"),
            connected,
            frames,
            report,
        }
    }

    /// Wait for the connection to finish and return what was observed.
    pub async fn finish(self) -> MockReport {
        tokio::time::timeout(Duration::from_secs(5), self.report)
            .await
            .expect("mock websocket did not finish")
            .unwrap_or_default()
    }
}

/// Provider that streams audio as fast as the socket allows while counting
/// everything the gateway sends, for sustained two-way traffic
pub struct FloodingUltravoxSocket {
    pub url: String,
    received: Arc<AtomicU64>,
}

impl FloodingUltravoxSocket {
    pub async fn start(frame_len: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock websocket listener");
        let addr = listener.local_addr().expect("mock listener address");
        let received = Arc::new(AtomicU64::new(0));

        let counter = received.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = accept_async(stream).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            tokio::spawn(async move {
                let frame = Bytes::from(vec![5u8; frame_len]);
                while write.send(Message::Binary(frame.clone())).await.is_ok() {}
            });

            while let Some(Ok(message)) = read.next().await {
                if let Message::Binary(data) = message {
                    counter.fetch_add(data.len() as u64, Ordering::Relaxed);
                }
            }
        });

        Self {
            url: format!("ws://{addr}"),
            received,
        }
    }

    /// Bytes of caller audio received so far
    pub fn received_bytes(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}
