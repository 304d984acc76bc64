//! Named capability registry.
//!
//! During bootstrap the host registers the capability modules the script
//! may call back into (timers, storage, device info, ...). The runtime
//! resolves them lazily by name; a lookup after unregister simply
//! returns `None`.
//!
//! Providers flagged `async_only` must never be invoked from a context
//! that expects a synchronous reply; the flag is recorded here and
//! enforced by the engine binding layer.

use crate::error::EngineError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A capability module the scripting runtime can call into.
pub trait CapabilityProvider: Send + Sync {
    /// Invokes `method(args)` on this capability.
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, EngineError>;
}

struct Registration {
    provider: Arc<dyn CapabilityProvider>,
    async_only: bool,
}

/// Registry of named capability providers.
///
/// Registration happens during bootstrap on the Scripting context;
/// resolution can happen from any context, so the map is lock-guarded.
///
/// # Example
///
/// ```
/// use hearth_engine::{CapabilityProvider, CapabilityRegistry, EngineError};
/// use serde_json::Value;
/// use std::sync::Arc;
///
/// struct Clock;
/// impl CapabilityProvider for Clock {
///     fn invoke(&self, _method: &str, _args: &[Value]) -> Result<Value, EngineError> {
///         Ok(Value::Null)
///     }
/// }
///
/// let registry = CapabilityRegistry::new();
/// registry.register("Clock", Arc::new(Clock), false);
/// assert!(registry.resolve("Clock").is_some());
/// assert_eq!(registry.is_async_only("Clock"), Some(false));
///
/// registry.unregister("Clock");
/// assert!(registry.resolve("Clock").is_none());
/// ```
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under `name`.
    ///
    /// Re-registering a name replaces the previous provider; the last
    /// registration wins.
    pub fn register(&self, name: &str, provider: Arc<dyn CapabilityProvider>, async_only: bool) {
        self.entries.write().insert(
            name.to_string(),
            Registration {
                provider,
                async_only,
            },
        );
    }

    /// Removes the provider registered under `name`.
    pub fn unregister(&self, name: &str) {
        self.entries.write().remove(name);
    }

    /// Resolves a provider by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn CapabilityProvider>> {
        self.entries
            .read()
            .get(name)
            .map(|r| Arc::clone(&r.provider))
    }

    /// Returns the `async_only` flag for `name`, if registered.
    #[must_use]
    pub fn is_async_only(&self, name: &str) -> Option<bool> {
        self.entries.read().get(name).map(|r| r.async_only)
    }

    /// Returns the registered capability names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Returns the number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes all registrations.
    ///
    /// Called by teardown before the engine handle is released, so no
    /// script callback can resolve a capability mid-destruction.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
