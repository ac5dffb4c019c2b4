//! The process-wide route registry.
//!
//! Built once at startup from an explicit list of schema types, then shared
//! read-only by every connection. Registering two schemas under the same
//! (type, subtype) key is a fatal configuration error, raised at build time
//! rather than deferred to first use.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::messages;
use crate::route::{decode_erased, DecodeFn, Payload, Routable, RouteKey};

/// Registry construction errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two schemas declared the same route key.
    #[error("duplicate route registration for {0}")]
    DuplicateRoute(RouteKey),
}

/// Maps a route key to the concrete payload shape used for deserialization.
#[derive(Clone, Copy)]
pub struct SchemaDescriptor {
    decode: DecodeFn,
    schema: &'static str,
}

impl SchemaDescriptor {
    fn new<T: Routable>() -> Self {
        Self {
            decode: decode_erased::<T>,
            schema: std::any::type_name::<T>(),
        }
    }

    /// Decode a raw frame into the schema's concrete type.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error if the frame does not match.
    pub fn decode(&self, raw: &str) -> Result<Payload, serde_json::Error> {
        (self.decode)(raw)
    }

    /// The decode function itself.
    #[must_use]
    pub fn decode_fn(&self) -> DecodeFn {
        self.decode
    }

    /// Name of the schema type, for diagnostics.
    #[must_use]
    pub fn schema_name(&self) -> &'static str {
        self.schema
    }
}

impl std::fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Immutable map from route key to schema descriptor.
///
/// At most one descriptor exists per key; handlers for keys the registry does
/// not know fall back to the schema inferred from the handler itself.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<RouteKey, SchemaDescriptor>,
}

impl RouteRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::default()
    }

    /// The registry of all built-in schemas, shared behind an `Arc`.
    #[must_use]
    pub fn standard() -> Arc<Self> {
        let registry = Self::builder()
            .schema::<messages::Hello>()
            .and_then(|b| b.schema::<messages::Ping>())
            .and_then(|b| b.schema::<messages::Pong>())
            .and_then(|b| b.schema::<messages::AckReply>())
            .and_then(|b| b.schema::<messages::ChatMessage>())
            .and_then(|b| b.schema::<messages::MessageChanged>())
            .and_then(|b| b.schema::<messages::MessageDeleted>())
            .and_then(|b| b.schema::<messages::PresenceChange>())
            .and_then(|b| b.schema::<messages::UserTyping>())
            .and_then(|b| b.schema::<messages::Goodbye>())
            .expect("built-in schemas declare unique routes")
            .build();
        Arc::new(registry)
    }

    /// Look up the descriptor for a route key.
    #[must_use]
    pub fn descriptor(&self, key: &RouteKey) -> Option<&SchemaDescriptor> {
        self.routes.get(key)
    }

    /// Whether a route key is registered.
    #[must_use]
    pub fn contains(&self, key: &RouteKey) -> bool {
        self.routes.contains_key(key)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder collecting schema registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct RouteRegistryBuilder {
    routes: HashMap<RouteKey, SchemaDescriptor>,
}

impl RouteRegistryBuilder {
    /// Register a schema under every route key it declares.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRoute`] if any key is already taken.
    /// Duplicate routes indicate an unrecoverable wiring bug.
    pub fn schema<T: Routable>(mut self) -> Result<Self, RegistryError> {
        for key in T::route_keys() {
            match self.routes.entry(key.clone()) {
                Entry::Occupied(_) => return Err(RegistryError::DuplicateRoute(key.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(SchemaDescriptor::new::<T>());
                }
            }
        }
        Ok(self)
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> RouteRegistry {
        RouteRegistry {
            routes: self.routes,
        }
    }
}
