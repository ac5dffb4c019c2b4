//! # tether-protocol
//!
//! Wire protocol definitions for the Tether socket client.
//!
//! Every frame on the wire is a JSON object that carries the generic
//! [`Envelope`] fields (id, reply_to, type, subtype, ok, error) alongside the
//! payload fields of a concrete schema. This crate defines:
//!
//! - **Envelope** - the generic outer shape used to classify frames
//! - **RouteKey / Routable** - (type, subtype) routing metadata declared by
//!   each schema type
//! - **RouteRegistry** - the process-wide, immutable map from route key to
//!   schema descriptor
//! - **codec** - JSON text encoding with id/type injection for requests
//! - **messages** - the built-in schema set
//!
//! ## Example
//!
//! ```rust
//! use tether_protocol::{codec, messages::Ping, RouteRegistry};
//!
//! let registry = RouteRegistry::standard();
//! let frame = codec::encode_frame(&Ping::default(), || 1).unwrap();
//! assert_eq!(frame.text, r#"{"id":1,"ok":true,"type":"ping"}"#);
//! ```

pub mod codec;
pub mod envelope;
pub mod messages;
pub mod registry;
pub mod route;

pub use codec::{EncodeError, EncodedFrame};
pub use envelope::{Envelope, ErrorDetail};
pub use registry::{RegistryError, RouteRegistry, SchemaDescriptor};
pub use route::{DecodeFn, Payload, Routable, RouteKey};
