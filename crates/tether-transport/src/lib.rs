//! # tether-transport
//!
//! Duplex text-frame wire abstraction for the Tether socket client.
//!
//! The engine never talks to a socket directly; it writes frames through a
//! [`WireSender`] and a reader task consumes a [`WireReceiver`]. Two
//! implementations are provided:
//!
//! - **websocket** - a client connection over tokio-tungstenite
//! - **memory** - an in-process pair for tests and local wiring
//!
//! ```rust,ignore
//! let (sender, receiver) = tether_transport::websocket::connect(url).await?;
//! ```

pub mod memory;
pub mod traits;
pub mod websocket;

pub use traits::{TransportError, WireReceiver, WireSender};
