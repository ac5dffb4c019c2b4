//! Built-in message schemas.
//!
//! Each schema declares its route keys via [`Routable`]; the set below seeds
//! [`RouteRegistry::standard`](crate::RouteRegistry::standard). Optional
//! fields skip serialization so outbound frames never carry nulls.

use serde::{Deserialize, Serialize};

use crate::envelope::ErrorDetail;
use crate::route::{Routable, RouteKey};

/// Sent by the server once the connection is established.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hello {}

impl Routable for Hello {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("hello")];
        KEYS
    }
}

/// Keepalive request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    /// Optional client timestamp echoed back in the pong.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Routable for Ping {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("ping")];
        KEYS
    }
}

/// Keepalive response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    /// Timestamp echoed from the ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Routable for Pong {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("pong")];
        KEYS
    }
}

/// Generic acknowledgement for requests whose reply carries only an
/// ok/error outcome and no payload of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckReply {
    /// Id of the acknowledged request.
    #[serde(default)]
    pub reply_to: u64,
    /// Whether the request succeeded.
    #[serde(default = "ack_ok_default")]
    pub ok: bool,
    /// Error detail when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

fn ack_ok_default() -> bool {
    true
}

impl Default for AckReply {
    fn default() -> Self {
        Self {
            reply_to: 0,
            ok: true,
            error: None,
        }
    }
}

impl Routable for AckReply {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("ack")];
        KEYS
    }
}

/// A chat message posted to a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Target channel.
    pub channel: String,
    /// Message body.
    pub text: String,
    /// Authoring user, absent on outbound frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Server-assigned timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl Routable for ChatMessage {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("message")];
        KEYS
    }
}

/// A previously posted message was edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageChanged {
    /// Channel the message lives in.
    pub channel: String,
    /// Timestamp of the edited message.
    pub ts: String,
    /// New body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Routable for MessageChanged {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::with_subtype("message", "message_changed")];
        KEYS
    }
}

/// A previously posted message was deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeleted {
    /// Channel the message lived in.
    pub channel: String,
    /// Timestamp of the deleted message.
    pub deleted_ts: String,
}

impl Routable for MessageDeleted {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::with_subtype("message", "message_deleted")];
        KEYS
    }
}

/// A user's presence changed, either organically or by manual override.
///
/// Declares two route keys; one schema matches both event types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceChange {
    /// The user whose presence changed.
    pub user: String,
    /// The new presence value, e.g. `"active"` or `"away"`.
    pub presence: String,
}

impl Routable for PresenceChange {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[
            RouteKey::of("presence_change"),
            RouteKey::of("manual_presence_change"),
        ];
        KEYS
    }
}

/// A user started typing in a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserTyping {
    /// Channel being typed in.
    pub channel: String,
    /// Typing user, absent on outbound frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Routable for UserTyping {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("user_typing")];
        KEYS
    }
}

/// The server is about to close the connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goodbye {}

impl Routable for Goodbye {
    fn route_keys() -> &'static [RouteKey] {
        const KEYS: &[RouteKey] = &[RouteKey::of("goodbye")];
        KEYS
    }
}
