//! In-memory paired wire.
//!
//! Gives tests (and in-process wiring) a real duplex connection without a
//! network: the client half implements the wire traits, the remote half
//! plays the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::traits::{TransportError, WireReceiver, WireSender};

struct Shared {
    open: AtomicBool,
    closed: Notify,
}

impl Shared {
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a receiver that checks `open` and
        // then awaits cannot miss a close landing in between.
        self.closed.notify_one();
    }
}

/// Create a connected wire pair.
///
/// Returns the client halves plus a [`MemoryRemote`] representing the peer.
#[must_use]
pub fn pair() -> (MemorySender, MemoryReceiver, MemoryRemote) {
    let (to_remote, from_client) = mpsc::unbounded_channel();
    let (to_client, from_remote) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        open: AtomicBool::new(true),
        closed: Notify::new(),
    });

    (
        MemorySender {
            frames: to_remote,
            shared: Arc::clone(&shared),
        },
        MemoryReceiver {
            frames: from_remote,
            shared: Arc::clone(&shared),
        },
        MemoryRemote {
            outbound: from_client,
            inbound: to_client,
            shared,
        },
    )
}

/// The client's writing half.
pub struct MemorySender {
    frames: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
}

#[async_trait]
impl WireSender for MemorySender {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.frames
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

/// The client's reading half.
pub struct MemoryReceiver {
    frames: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
}

#[async_trait]
impl WireReceiver for MemoryReceiver {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return self.frames.try_recv().ok().map(Ok);
        }
        tokio::select! {
            frame = self.frames.recv() => frame.map(Ok),
            () = self.shared.closed.notified() => None,
        }
    }
}

/// The peer end of an in-memory wire.
pub struct MemoryRemote {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
}

impl MemoryRemote {
    /// The next frame the client wrote, in send order.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Deliver a frame to the client.
    pub fn send(&self, frame: impl Into<String>) {
        let _ = self.inbound.send(frame.into());
    }

    /// Close the connection from the remote side.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether the client side still considers the wire open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (sender, mut receiver, mut remote) = pair();

        sender.send_text("out".to_string()).await.unwrap();
        assert_eq!(remote.recv().await.as_deref(), Some("out"));

        remote.send("in");
        let frame = receiver.next_text().await.unwrap().unwrap();
        assert_eq!(frame, "in");
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let (sender, mut receiver, remote) = pair();

        remote.close();
        assert!(!sender.is_open());
        assert!(receiver.next_text().await.is_none());
        assert!(matches!(
            sender.send_text("late".to_string()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn client_close_is_idempotent() {
        let (sender, _receiver, remote) = pair();

        sender.close().await.unwrap();
        sender.close().await.unwrap();
        assert!(!remote.is_open());
    }
}
