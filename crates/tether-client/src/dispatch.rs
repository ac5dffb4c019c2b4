//! The receive dispatcher.
//!
//! The reader task consumes the wire in arrival order and classifies each
//! frame: a nonzero `reply_to` resolves against the correlation table
//! (taking precedence over type routing), anything else routes by
//! (type, subtype). Handling runs on an independent task per frame, so
//! handlers for different frames may overlap; nothing raised during
//! dispatch crosses back into the transport.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::DispatchError;
use crate::events::SocketEvent;
use crate::socket::{SocketShared, SocketState};
use tether_protocol::{codec, Envelope};
use tether_transport::WireReceiver;

pub(crate) async fn read_loop(shared: Arc<SocketShared>, mut wire: Box<dyn WireReceiver>) {
    while let Some(next) = wire.next_text().await {
        match next {
            Ok(raw) => match codec::decode_envelope(&raw) {
                Ok(envelope) => {
                    // Classification order is arrival order; handling is not.
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        dispatch_frame(&shared, &envelope, &raw);
                    });
                }
                Err(e) => {
                    debug!(error = %e, "dropping undecodable frame");
                    shared.events.emit(SocketEvent::DeserializationError(e));
                }
            },
            Err(e) => {
                shared.events.emit(SocketEvent::ReceiveError(e));
            }
        }
    }

    debug!("wire ended, stopping dispatcher");
    shared.set_state(SocketState::Closed);
    shared.emit_closed();
}

fn dispatch_frame(shared: &SocketShared, envelope: &Envelope, raw: &str) {
    if envelope.is_reply() {
        if let Some(reply) = shared.pending.take(envelope.reply_to) {
            trace!(id = envelope.reply_to, "delivering reply");
            reply(raw);
            return;
        }
        // Unknown correlation id: fall through to type routing, matching
        // the at-most-once contract for replies.
    }

    let Some(key) = envelope.route_key() else {
        shared
            .events
            .emit(SocketEvent::HandlingError(DispatchError::Untyped));
        return;
    };

    let Some(plan) = shared.handlers.lookup(&key) else {
        debug!(key = %key, "no route for frame");
        shared
            .events
            .emit(SocketEvent::HandlingError(DispatchError::NoRoute { key }));
        return;
    };

    // Prefer the registry's schema; fall back to the one inferred from the
    // bound handlers for routes the registry does not know.
    let (decode, schema) = match shared.registry.descriptor(&key) {
        Some(descriptor) => (descriptor.decode_fn(), descriptor.schema_name()),
        None => (plan.decode, plan.schema),
    };

    let payload = match decode(raw) {
        Ok(payload) => payload,
        Err(source) => {
            shared
                .events
                .emit(SocketEvent::HandlingError(DispatchError::Decode {
                    schema,
                    source,
                }));
            return;
        }
    };

    trace!(key = %key, handlers = plan.handlers.len(), "dispatching frame");
    for handler in plan.handlers {
        match catch_unwind(AssertUnwindSafe(|| (handler.call)(payload.as_ref()))) {
            // A false return means the handler was bound for a different
            // schema than the one the payload decoded to; skipping it
            // silently would bury a wiring bug.
            Ok(false) => {
                shared
                    .events
                    .emit(SocketEvent::HandlingError(DispatchError::SchemaMismatch {
                        key: key.clone(),
                        handler_schema: handler.schema,
                        payload_schema: schema,
                    }));
            }
            Ok(true) => {}
            Err(panic) => {
                // Surfaced as an event, then re-raised so the failure is not
                // swallowed; only this dispatch task dies.
                shared
                    .events
                    .emit(SocketEvent::HandlingError(DispatchError::HandlerPanic {
                        key: key.clone(),
                    }));
                resume_unwind(panic);
            }
        }
    }
}
