//! # tether-client
//!
//! Message routing and correlation engine for a single persistent duplex
//! JSON-envelope connection.
//!
//! The engine serializes outbound requests and assigns them correlation
//! ids, drains them onto the wire without interleaving concurrent writers,
//! classifies every inbound frame as a reply to a pending request or an
//! unsolicited event, and multicasts events to the handlers registered for
//! their (type, subtype) key.
//!
//! ## Architecture
//!
//! ```text
//! send ──▶ assign id ──▶ queue ──▶ drain worker ──▶ wire
//!
//! wire ──▶ reader ──▶ reply?  ──▶ correlation table ──▶ one-shot callback
//!                  └─ event?  ──▶ handler table + route registry ──▶ handlers
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_client::{Routes, Socket, SocketConfig};
//! use tether_protocol::messages::{ChatMessage, Hello, Ping};
//! use tether_protocol::RouteRegistry;
//!
//! let routes = Routes::new()
//!     .on::<Hello, _>(|_| println!("connected"))
//!     .on::<ChatMessage, _>(|m| println!("{}: {}", m.channel, m.text));
//!
//! let (socket, mut events) =
//!     Socket::connect(SocketConfig::new(url), routes, RouteRegistry::standard()).await;
//! socket.send(&Ping::default())?;
//! ```

pub mod config;
mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
mod pending;
pub mod socket;

pub use config::{ConfigError, SocketConfig};
pub use error::DispatchError;
pub use events::{EventReceiver, SocketEvent};
pub use handlers::{BindingId, HandlerTable, Routes};
pub use socket::{Socket, SocketState};

pub use tether_protocol::{EncodeError, Routable, RouteKey, RouteRegistry};
pub use tether_transport::TransportError;
