//! JSON text framing for outbound requests.
//!
//! Outbound messages are serialized once, with the correlation id and route
//! metadata stamped into the object before the frame is queued. Null-valued
//! payload fields are omitted (schemas mark optionals with
//! `skip_serializing_if`), and `ok` defaults to true on the wire.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::route::Routable;

/// Errors raised while encoding a request.
///
/// These are configuration errors: a message that cannot be encoded cannot
/// be sent at all, so they surface synchronously instead of via events.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The schema declares no route key, so the frame has no destination.
    #[error("{0} declares no route, cannot send without a destination")]
    NoRoute(&'static str),

    /// The payload did not serialize to a JSON object.
    #[error("{0} must serialize to a JSON object")]
    NotAnObject(&'static str),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A fully serialized text frame and the correlation id it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// The id stamped into the frame.
    pub id: u64,
    /// The final wire text.
    pub text: String,
}

/// Serialize `message` into a wire frame.
///
/// If the payload carries no nonzero `id`, one is taken from `assign_id`.
/// If it carries no `type`, the type and subtype are resolved from the last
/// route key the schema declares.
///
/// # Errors
///
/// Returns [`EncodeError::NoRoute`] when type resolution is needed but the
/// schema declares no keys, [`EncodeError::NotAnObject`] for non-object
/// payloads, or a serialization error.
pub fn encode_frame<T: Routable>(
    message: &T,
    assign_id: impl FnOnce() -> u64,
) -> Result<EncodedFrame, EncodeError> {
    let schema = std::any::type_name::<T>();
    let mut value = serde_json::to_value(message)?;
    let object = value
        .as_object_mut()
        .ok_or(EncodeError::NotAnObject(schema))?;

    let id = match object.get("id").and_then(Value::as_u64) {
        Some(id) if id != 0 => id,
        _ => {
            let id = assign_id();
            object.insert("id".to_string(), Value::from(id));
            id
        }
    };

    let has_type = object
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| !kind.is_empty());
    if !has_type {
        let key = T::route_keys()
            .last()
            .ok_or(EncodeError::NoRoute(schema))?;
        object.insert("type".to_string(), Value::from(key.kind()));
        if let Some(subtype) = key.subtype() {
            object.insert("subtype".to_string(), Value::from(subtype));
        }
    }

    object
        .entry("ok")
        .or_insert(Value::Bool(true));

    Ok(EncodedFrame {
        id,
        text: serde_json::to_string(&value)?,
    })
}

/// Deserialize the generic envelope of an inbound frame.
///
/// # Errors
///
/// Returns the JSON error when the frame is not a valid envelope object.
pub fn decode_envelope(raw: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(raw)
}
