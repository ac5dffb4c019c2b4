//! The generic envelope wrapping every wire frame.
//!
//! Inbound frames are first deserialized to [`Envelope`] to decide whether
//! they correlate to a pending request (`reply_to`) or route by
//! (type, subtype). Concrete payload fields are ignored at this stage and
//! re-deserialized into the schema the route resolves to.

use serde::{Deserialize, Serialize};

use crate::route::RouteKey;

/// The generic outer JSON object of every frame.
///
/// `id` is assigned by the sender for requests (0 = unset); `reply_to` is
/// populated by the remote side to echo the originating request's id. A frame
/// with a nonzero `reply_to` is always treated as a reply, regardless of its
/// `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id of a request; 0 means unassigned.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u64,

    /// Id of the request this frame answers; 0 means "not a reply".
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reply_to: u64,

    /// Message type, e.g. `"message"`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Message subtype, e.g. `"message_changed"`. Absent and null are
    /// equivalent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// Whether the remote side reports success. Defaults to true.
    #[serde(default = "default_true")]
    pub ok: bool,

    /// Error detail when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Error detail carried by failed replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Protocol error code.
    pub code: i64,
    /// Human-readable error message.
    pub msg: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn default_true() -> bool {
    true
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            id: 0,
            reply_to: 0,
            kind: None,
            subtype: None,
            ok: true,
            error: None,
        }
    }
}

impl Envelope {
    /// Whether this frame answers a pending request.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.reply_to != 0
    }

    /// The (type, subtype) route key of this frame, if it carries a type.
    #[must_use]
    pub fn route_key(&self) -> Option<RouteKey> {
        self.kind
            .as_deref()
            .map(|kind| RouteKey::from_wire(kind, self.subtype.as_deref()))
    }
}
