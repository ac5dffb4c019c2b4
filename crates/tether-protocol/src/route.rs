//! Route keys and the schema metadata trait.
//!
//! A route key is the (type, subtype) pair used to look up a schema or a
//! handler set. "No subtype" is represented as `None`, which can never
//! collide with a real subtype string.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The (type, subtype) pair messages are routed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    kind: Cow<'static, str>,
    subtype: Option<Cow<'static, str>>,
}

impl RouteKey {
    /// A key with no subtype.
    #[must_use]
    pub const fn of(kind: &'static str) -> Self {
        Self {
            kind: Cow::Borrowed(kind),
            subtype: None,
        }
    }

    /// A key with a subtype.
    #[must_use]
    pub const fn with_subtype(kind: &'static str, subtype: &'static str) -> Self {
        Self {
            kind: Cow::Borrowed(kind),
            subtype: Some(Cow::Borrowed(subtype)),
        }
    }

    /// Build a key from inbound frame fields.
    #[must_use]
    pub fn from_wire(kind: &str, subtype: Option<&str>) -> Self {
        Self {
            kind: Cow::Owned(kind.to_string()),
            subtype: subtype.map(|s| Cow::Owned(s.to_string())),
        }
    }

    /// The message type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The message subtype, if any.
    #[must_use]
    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtype {
            Some(subtype) => write!(f, "{}.{}", self.kind, subtype),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A decoded payload, type-erased for multicast delivery.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Decodes a raw text frame into a type-erased concrete payload.
pub type DecodeFn = fn(&str) -> Result<Payload, serde_json::Error>;

/// A message schema that declares its own routing metadata.
///
/// A type may declare more than one key, e.g. to match several subtypes with
/// one schema. The last declared key is the one used to stamp outbound
/// frames that carry no explicit type.
pub trait Routable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The route keys this schema matches.
    fn route_keys() -> &'static [RouteKey];
}

/// Decode `raw` into `T`, erased behind [`Payload`].
///
/// # Errors
///
/// Returns the underlying JSON error if `raw` does not match `T`.
pub fn decode_erased<T: Routable>(raw: &str) -> Result<Payload, serde_json::Error> {
    Ok(Arc::new(serde_json::from_str::<T>(raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_key_equals_static_key() {
        assert_eq!(
            RouteKey::from_wire("message", Some("message_changed")),
            RouteKey::with_subtype("message", "message_changed")
        );
        assert_eq!(RouteKey::from_wire("ping", None), RouteKey::of("ping"));
    }

    #[test]
    fn subtype_distinguishes_keys() {
        assert_ne!(
            RouteKey::of("message"),
            RouteKey::with_subtype("message", "message_changed")
        );
    }

    #[test]
    fn display_includes_subtype() {
        assert_eq!(RouteKey::of("ping").to_string(), "ping");
        assert_eq!(
            RouteKey::with_subtype("message", "message_deleted").to_string(),
            "message.message_deleted"
        );
    }
}
