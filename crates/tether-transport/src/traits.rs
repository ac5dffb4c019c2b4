//! Wire abstraction traits.
//!
//! A wire carries newline-free text frames both ways. The sending half is
//! shared (the drain worker and lifecycle code both hold it); the receiving
//! half is owned exclusively by the reader task.

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Opening the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to write a frame.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Failed to read a frame.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The writing half of a duplex text-frame connection.
#[async_trait]
pub trait WireSender: Send + Sync {
    /// Write one text frame to the wire.
    async fn send_text(&self, frame: String) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

/// The reading half of a duplex text-frame connection.
#[async_trait]
pub trait WireReceiver: Send {
    /// The next text frame, in arrival order.
    ///
    /// Returns `None` once the connection ends; `Some(Err(_))` reports a
    /// receive failure without ending the stream.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;
}
