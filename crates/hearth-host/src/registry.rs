//! Process-wide instance registry.
//!
//! Cross-context callbacks and the process fault handler never hold a
//! pointer to an instance. They hold its [`InstanceId`] and resolve it
//! here; when the instance is gone the lookup fails and the caller
//! no-ops. Registration is tied to construction and teardown, and ids
//! are never reused, so a stale id can only ever resolve to nothing.

use crate::instance::InstanceShared;
use hearth_types::InstanceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

fn registry() -> &'static Mutex<HashMap<InstanceId, Weak<InstanceShared>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<InstanceId, Weak<InstanceShared>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers a live instance under its id.
pub(crate) fn register(id: InstanceId, instance: Weak<InstanceShared>) {
    registry().lock().insert(id, instance);
    debug!("registered instance {}", id);
}

/// Removes an instance from the registry. Idempotent.
pub(crate) fn unregister(id: InstanceId) {
    if registry().lock().remove(&id).is_some() {
        debug!("unregistered instance {}", id);
    }
}

/// Resolves a live instance by id.
///
/// Returns `None` when the id was never registered, was unregistered,
/// or the instance has been dropped.
pub(crate) fn resolve(id: InstanceId) -> Option<Arc<InstanceShared>> {
    registry().lock().get(&id).and_then(Weak::upgrade)
}

/// Fans a process fault out to every live instance.
///
/// Each instance forwards the detail to its engine's fault hook so the
/// engine can record diagnostic state. Dead entries are pruned as a
/// side effect.
pub fn dispatch_fault(detail: &str) {
    let live: Vec<Arc<InstanceShared>> = {
        let mut entries = registry().lock();
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.values().filter_map(Weak::upgrade).collect()
    };

    for instance in live {
        instance.record_fault(detail);
    }
}
