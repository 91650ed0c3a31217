//! Axum websocket adapted to the hub's [`Connection`] trait.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use prompt_hub::{Connection, HubError};
use tokio::sync::Mutex;
use tracing::trace;

/// One observer's websocket.
///
/// The socket is split so the hub's receive loop can wait on the read half
/// while broadcasts write to the other.
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    /// We started or answered the close handshake
    close_sent: AtomicBool,
    /// The peer sent Close or the stream ended
    peer_closed: AtomicBool,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            close_sent: AtomicBool::new(false),
            peer_closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, payload: &[u8]) -> Result<(), HubError> {
        if self.close_sent.load(Ordering::Acquire) || self.peer_closed.load(Ordering::Acquire) {
            return Err(HubError::SendFailed("connection closed".to_string()));
        }

        // Status messages are JSON; anything else goes out as a binary frame.
        let msg = match std::str::from_utf8(payload) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(payload.to_vec().into()),
        };

        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| HubError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<Vec<u8>, HubError> {
        loop {
            let next = self.stream.lock().await.next().await;
            match next {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                // axum answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    trace!(?frame, "peer sent close");
                    self.peer_closed.store(true, Ordering::Release);
                    return Err(HubError::ReceiveFailed("peer closed".to_string()));
                }
                Some(Err(e)) => return Err(HubError::ReceiveFailed(e.to_string())),
                None => {
                    self.peer_closed.store(true, Ordering::Release);
                    return Err(HubError::ReceiveFailed("stream ended".to_string()));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), HubError> {
        if self.close_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // After a peer Close this flushes our queued reply frame.
        let result = self.sink.lock().await.close().await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.peer_closed.load(Ordering::Acquire) => {
                trace!("close after peer close: {e}");
                Ok(())
            }
            Err(e) => Err(HubError::SendFailed(e.to_string())),
        }
    }
}
