//! Dispatch-side error taxonomy.
//!
//! Everything here is non-fatal to the connection: it is caught at the
//! dispatch boundary and surfaced as a
//! [`HandlingError`](crate::SocketEvent::HandlingError) event instead of
//! unwinding into the transport's callback path.

use thiserror::Error;

use tether_protocol::RouteKey;

/// Failures while classifying or handling an inbound frame.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame matched no pending request and no registered route.
    #[error("no route for {key}")]
    NoRoute {
        /// The (type, subtype) key that had no handlers.
        key: RouteKey,
    },

    /// The frame was neither a reply nor carried a type.
    #[error("no route for frame without a type")]
    Untyped,

    /// The payload did not match the schema resolved for its route.
    #[error("failed to decode {schema} payload: {source}")]
    Decode {
        /// Name of the schema type the route resolved to.
        schema: &'static str,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload at a route key decoded to a different schema than a
    /// handler at the same key was bound for. The handler did not run.
    #[error("handler for {key} expects {handler_schema}, payload decoded as {payload_schema}")]
    SchemaMismatch {
        /// The (type, subtype) key both parties registered under.
        key: RouteKey,
        /// Schema the skipped handler was bound for.
        handler_schema: &'static str,
        /// Schema the payload was decoded as.
        payload_schema: &'static str,
    },

    /// A handler callback panicked. The panic is re-raised in the dispatch
    /// task after this event is emitted.
    #[error("handler for {key} panicked")]
    HandlerPanic {
        /// The key whose handler panicked.
        key: RouteKey,
    },

    /// A reply arrived but did not match the caller's expected reply type.
    #[error("reply to request {id} failed to decode: {source}")]
    ReplyDecode {
        /// Correlation id of the request.
        id: u64,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// No reply arrived within the configured timeout; the pending entry
    /// was removed.
    #[error("no reply to request {id} within {timeout_ms} ms")]
    ReplyTimedOut {
        /// Correlation id of the request.
        id: u64,
        /// The configured timeout.
        timeout_ms: u64,
    },
}
