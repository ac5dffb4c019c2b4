//! WebSocket client wire implementation over tokio-tungstenite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::traits::{TransportError, WireReceiver, WireSender};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection and split it into wire halves.
///
/// # Errors
///
/// Returns [`TransportError::ConnectFailed`] if the handshake fails.
pub async fn connect(url: &str) -> Result<(WebSocketSender, WebSocketReceiver), TransportError> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    debug!(%url, "WebSocket handshake completed");

    let (sink, stream) = stream.split();
    let open = Arc::new(AtomicBool::new(true));

    Ok((
        WebSocketSender {
            sink: Mutex::new(sink),
            open: Arc::clone(&open),
        },
        WebSocketReceiver { stream, open },
    ))
}

/// The writing half of a WebSocket wire.
pub struct WebSocketSender {
    sink: Mutex<SplitSink<WsStream, Message>>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl WireSender for WebSocketSender {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(frame)).await.map_err(|e| {
            self.open.store(false, Ordering::SeqCst);
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// The reading half of a WebSocket wire.
pub struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl WireReceiver for WebSocketReceiver {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Binary(data))) => {
                    // The protocol is text; tolerate peers that flag frames
                    // as binary.
                    match String::from_utf8(data) {
                        Ok(text) => return Some(Ok(text)),
                        Err(e) => {
                            warn!("dropping non-UTF-8 binary frame: {}", e);
                            return Some(Err(TransportError::ReceiveFailed(e.to_string())));
                        }
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!("received close frame");
                    self.open.store(false, Ordering::SeqCst);
                    return None;
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    self.open.store(false, Ordering::SeqCst);
                    return None;
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    self.open.store(false, Ordering::SeqCst);
                    return Some(Err(TransportError::ReceiveFailed(e.to_string())));
                }
                None => {
                    debug!("WebSocket stream ended");
                    self.open.store(false, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }
}
