//! Per-connection multicast handler table.
//!
//! Maps a route key to an ordered set of callbacks. Binding appends, and
//! every callback at a key runs in registration order for each matching
//! inbound frame. Each entry also remembers a decode function inferred from
//! the first handler bound for the key, used when the route registry has no
//! descriptor for it.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use tether_protocol::route::decode_erased;
use tether_protocol::{DecodeFn, Routable, RouteKey};

/// Identifies one `bind` call so it can later be unbound.
///
/// Closures have no identity of their own, so binding hands back a token
/// instead of comparing callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

/// Invokes the typed callback if the payload downcasts to its schema;
/// returns whether it did. A `false` means the payload was decoded as a
/// different type than the handler was bound for.
pub(crate) type HandlerFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> bool + Send + Sync>;

#[derive(Clone)]
struct Binding {
    id: BindingId,
    schema: &'static str,
    call: HandlerFn,
}

struct RouteEntry {
    /// Fallback decoder, taken from the first handler bound at this key.
    decode: DecodeFn,
    schema: &'static str,
    handlers: Vec<Binding>,
}

/// One callback in a dispatch plan, with the schema it expects.
pub(crate) struct BoundHandler {
    pub(crate) schema: &'static str,
    pub(crate) call: HandlerFn,
}

/// Resolved dispatch plan for one route key.
pub(crate) struct RouteHandlers {
    pub(crate) decode: DecodeFn,
    pub(crate) schema: &'static str,
    pub(crate) handlers: Vec<BoundHandler>,
}

/// Multicast dispatch map from route key to callbacks.
///
/// Safe to mutate concurrently with dispatch; callbacks are snapshotted
/// before invocation so a handler may bind or unbind from inside itself.
#[derive(Default)]
pub struct HandlerTable {
    routes: DashMap<RouteKey, RouteEntry>,
    next_binding: AtomicU64,
}

impl HandlerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under every route key `T` declares.
    ///
    /// Returns the token to pass to [`unbind`](Self::unbind).
    pub fn bind<T, F>(&self, callback: F) -> BindingId
    where
        T: Routable,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = BindingId(self.next_binding.fetch_add(1, Ordering::Relaxed) + 1);
        let callback = Arc::new(callback);
        let call: HandlerFn = Arc::new(move |payload| {
            match payload.downcast_ref::<T>() {
                Some(message) => {
                    callback(message);
                    true
                }
                None => false,
            }
        });

        for key in T::route_keys() {
            let mut entry = self.routes.entry(key.clone()).or_insert_with(|| RouteEntry {
                decode: decode_erased::<T>,
                schema: std::any::type_name::<T>(),
                handlers: Vec::new(),
            });
            entry.handlers.push(Binding {
                id,
                schema: std::any::type_name::<T>(),
                call: Arc::clone(&call),
            });
            debug!(key = %key, handlers = entry.handlers.len(), "bound callback");
        }

        id
    }

    /// Remove the callback bound with `binding` from every key `T` declares,
    /// leaving other callbacks at those keys intact.
    pub fn unbind<T: Routable>(&self, binding: BindingId) {
        for key in T::route_keys() {
            let mut empty = false;
            if let Some(mut entry) = self.routes.get_mut(key) {
                if let Some(position) = entry.handlers.iter().position(|b| b.id == binding) {
                    entry.handlers.remove(position);
                    debug!(key = %key, handlers = entry.handlers.len(), "unbound callback");
                }
                empty = entry.handlers.is_empty();
            }
            if empty {
                self.routes.remove_if(key, |_, entry| entry.handlers.is_empty());
            }
        }
    }

    /// Snapshot the handlers registered for `key`, in registration order.
    pub(crate) fn lookup(&self, key: &RouteKey) -> Option<RouteHandlers> {
        self.routes.get(key).map(|entry| RouteHandlers {
            decode: entry.decode,
            schema: entry.schema,
            handlers: entry
                .handlers
                .iter()
                .map(|b| BoundHandler {
                    schema: b.schema,
                    call: Arc::clone(&b.call),
                })
                .collect(),
        })
    }

    /// Number of keys with at least one handler.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether any handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Construction-time wiring: enumerate callbacks up front, then hand the
/// finished table to the connection.
///
/// ```rust
/// use tether_client::Routes;
/// use tether_protocol::messages::{ChatMessage, Hello};
///
/// let routes = Routes::new()
///     .on::<Hello, _>(|_| println!("connected"))
///     .on::<ChatMessage, _>(|m| println!("<{:?}> {}", m.user, m.text));
/// ```
#[derive(Default)]
pub struct Routes {
    table: HandlerTable,
}

impl Routes {
    /// Start with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire `callback` to every key `T` declares.
    #[must_use]
    pub fn on<T, F>(self, callback: F) -> Self
    where
        T: Routable,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.table.bind::<T, F>(callback);
        self
    }

    pub(crate) fn into_table(self) -> HandlerTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tether_protocol::messages::{ChatMessage, PresenceChange};

    fn chat(text: &str) -> ChatMessage {
        ChatMessage {
            channel: "C1".to_string(),
            text: text.to_string(),
            ..ChatMessage::default()
        }
    }

    fn invoke(table: &HandlerTable, key: &RouteKey, message: &ChatMessage) {
        let plan = table.lookup(key).unwrap();
        let payload: tether_protocol::Payload = Arc::new(message.clone());
        for handler in plan.handlers {
            assert!((handler.call)(payload.as_ref()));
        }
    }

    #[test]
    fn multicast_runs_in_registration_order() {
        let table = HandlerTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        table.bind::<ChatMessage, _>(move |_| first.lock().unwrap().push("first"));
        let second = Arc::clone(&seen);
        table.bind::<ChatMessage, _>(move |_| second.lock().unwrap().push("second"));

        invoke(&table, &RouteKey::of("message"), &chat("hi"));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn unbind_removes_exactly_one_callback() {
        let table = HandlerTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let binding = table.bind::<ChatMessage, _>(move |_| first.lock().unwrap().push("first"));
        let second = Arc::clone(&seen);
        table.bind::<ChatMessage, _>(move |_| second.lock().unwrap().push("second"));

        table.unbind::<ChatMessage>(binding);
        invoke(&table, &RouteKey::of("message"), &chat("hi"));
        assert_eq!(*seen.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn unbinding_last_callback_clears_the_route() {
        let table = HandlerTable::new();
        let binding = table.bind::<ChatMessage, _>(|_| {});
        assert_eq!(table.len(), 1);

        table.unbind::<ChatMessage>(binding);
        assert!(table.is_empty());
        assert!(table.lookup(&RouteKey::of("message")).is_none());
    }

    #[test]
    fn multi_key_schema_binds_every_key() {
        let table = HandlerTable::new();
        table.bind::<PresenceChange, _>(|_| {});
        assert!(table.lookup(&RouteKey::of("presence_change")).is_some());
        assert!(table.lookup(&RouteKey::of("manual_presence_change")).is_some());
    }

    #[test]
    fn handler_reports_a_payload_of_the_wrong_type() {
        let table = HandlerTable::new();
        table.bind::<ChatMessage, _>(|_| panic!("must not run"));

        let plan = table.lookup(&RouteKey::of("message")).unwrap();
        let payload: tether_protocol::Payload = Arc::new(PresenceChange::default());
        for handler in plan.handlers {
            assert!(!(handler.call)(payload.as_ref()));
            assert!(handler.schema.ends_with("ChatMessage"));
        }
    }

    #[test]
    fn entry_decode_falls_back_to_bound_schema() {
        let table = HandlerTable::new();
        table.bind::<ChatMessage, _>(|_| {});
        let plan = table.lookup(&RouteKey::of("message")).unwrap();
        let payload = (plan.decode)(r#"{"channel":"C1","text":"hi"}"#).unwrap();
        assert!(payload.downcast_ref::<ChatMessage>().is_some());
    }
}
