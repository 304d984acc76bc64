//! Teardown sequencing.
//!
//! `destroy()` is idempotent - every call observes the same "destroyed"
//! completion - and executes exactly one teardown:
//!
//! 1. Claim the destroy flag; transition to `Unloaded`; discard the
//!    call buffer (outside the register lock).
//! 2. Revoke cross-context registrations (process registry entry,
//!    capability bindings) *before* the engine goes away - they can be
//!    invoked concurrently until explicitly revoked.
//! 3. On the Scripting context: release the engine handle under the
//!    slot lock, stop the context from accepting further work, then
//!    settle "destroyed" - whose first action is force-cancelling
//!    "loaded", preserving the loaded-before-destroyed ordering.
//!
//! The scripting job is the last work item that context runs for the
//! instance; nothing can execute against a half-destroyed engine
//! because release and every call share that context's FIFO.

use crate::error::HostError;
use crate::instance::InstanceShared;
use crate::promise::OncePromise;
use crate::registry;
use crate::state::LifecycleState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Completion handle returned by `destroy()`.
///
/// All handles for one instance observe the same settlement.
#[derive(Clone, Debug)]
pub struct DestroyedHandle {
    promise: OncePromise<()>,
}

impl DestroyedHandle {
    pub(crate) fn new(promise: OncePromise<()>) -> Self {
        Self { promise }
    }

    /// Waits until teardown completed.
    pub async fn wait(&self) -> Result<(), HostError> {
        self.promise.wait().await
    }

    /// Returns `true` once teardown completed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.promise.is_settled()
    }
}

/// Executes the teardown sequence (at most once).
pub(crate) fn destroy(shared: &Arc<InstanceShared>) -> DestroyedHandle {
    let handle = DestroyedHandle::new(shared.when_destroyed.clone());

    if shared.destroy_started.swap(true, Ordering::AcqRel) {
        debug!("{}: destroy already in progress", shared.id);
        return handle;
    }
    info!("{}: destroying", shared.id);

    // 1. Terminal transition (a prior HasError keeps its state) and
    //    buffer discard.
    let _ = shared.register.transition_to(LifecycleState::Unloaded);
    shared.abandon_queued_calls();

    // 2. Revoke registrations that other contexts could still invoke.
    registry::unregister(shared.id);
    shared.capabilities.clear();

    // 3. Release the engine as the context's final work item.
    let s = Arc::clone(shared);
    let posted = shared.contexts.scripting().post(move || {
        let engine = s.engine.lock().take();
        drop(engine);

        // No further work lands on this context for the instance.
        s.contexts.scripting().close();

        // Loaded settles (cancellation-tagged if still pending) strictly
        // before destroyed.
        s.when_loaded.try_cancel();
        s.when_destroyed.settle(Ok(()));
        Ok(())
    });

    if !posted {
        // Scripting context already gone; resolve inline, same order.
        shared.engine.lock().take();
        shared.when_loaded.try_cancel();
        shared.when_destroyed.settle(Ok(()));
    }

    handle
}
