//! Asynchronous failure notifications.
//!
//! The four events below are the only channel through which the engine
//! reports asynchronous failures; send operations have no other error
//! surface beyond the synchronous configuration errors.

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::DispatchError;
use tether_transport::TransportError;

/// Events raised to the connection's owner.
#[derive(Debug)]
pub enum SocketEvent {
    /// The transport failed to connect, read, or write.
    ReceiveError(TransportError),
    /// An inbound frame was not a valid envelope and was dropped.
    DeserializationError(serde_json::Error),
    /// Routing or handling of an inbound frame failed; the connection
    /// continues.
    HandlingError(DispatchError),
    /// The connection closed. Emitted exactly once.
    Closed,
}

/// Receiving end of the event channel, handed out at construction.
pub type EventReceiver = mpsc::UnboundedReceiver<SocketEvent>;

/// Internal emitter; dropping the receiver silences events without
/// affecting the engine.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<SocketEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: SocketEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped, discarding event");
        }
    }
}
