//! The hosted scripting instance.
//!
//! [`ScriptInstance`] is the public surface the rest of the system uses:
//! construct, [`initialize`](ScriptInstance::initialize), issue calls,
//! [`destroy`](ScriptInstance::destroy). Everything else - contexts,
//! state register, promises, sequencers - hangs off the shared inner
//! state and is driven through those four entry points.
//!
//! # Call Dispatch
//!
//! `call_function` reads the state and mutates the buffer in one
//! critical section, then executes the decision outside the lock:
//!
//! - `Loaded` with an empty buffer → post the call to the Scripting
//!   context now
//! - `Loading`/`WaitingForDebugger`, or `Loaded` with a backlog → append
//!   to the buffer (strict FIFO across the load transition)
//! - terminal states → drop silently
//!
//! # Back-references
//!
//! Jobs posted to context queues capture the shared state only for the
//! duration of the job. Long-lived hooks (queue error hooks, debugger
//! hooks) capture the [`InstanceId`] and resolve it through the process
//! registry, so they no-op once the instance is gone.

use crate::bootstrap;
use crate::context::ContextSet;
use crate::error::HostError;
use crate::options::{Collaborators, InstanceOptions};
use crate::promise::OncePromise;
use crate::registry;
use crate::state::{BufferedCall, Decision, LifecycleState, StateRegister};
use crate::teardown::{self, DestroyedHandle};
use hearth_engine::{CapabilityRegistry, ScriptEngine};
use hearth_types::InstanceId;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Module the event dispatch path targets inside the runtime.
const EVENT_EMITTER_MODULE: &str = "EventEmitter";
/// Method receiving dispatched events.
const EVENT_EMITTER_METHOD: &str = "receiveEvent";

/// Shared state of one instance.
///
/// Owned by the public [`ScriptInstance`] handle plus any in-flight
/// context jobs; dropped when the last of them goes away.
pub(crate) struct InstanceShared {
    pub(crate) id: InstanceId,
    pub(crate) options: InstanceOptions,
    pub(crate) collaborators: Collaborators,
    pub(crate) contexts: ContextSet,
    pub(crate) register: StateRegister,
    pub(crate) engine: Mutex<Option<Arc<dyn ScriptEngine>>>,
    pub(crate) capabilities: CapabilityRegistry,
    pub(crate) when_created: OncePromise<()>,
    pub(crate) when_loaded: OncePromise<()>,
    pub(crate) when_destroyed: OncePromise<()>,
    /// Guards the load completion (transition + drain) so it runs once
    /// no matter how many paths report completion.
    pub(crate) load_completed: AtomicBool,
    pub(crate) destroy_started: AtomicBool,
    initialized: AtomicBool,
}

impl InstanceShared {
    /// Executes a dispatch decision for `call`.
    pub(crate) fn call_function(self: &Arc<Self>, module: &str, method: &str, args: Vec<Value>) {
        let call = BufferedCall::new(module, method, args);
        match self.register.enqueue_or_dispatch(call) {
            Decision::Dispatch(call) => self.dispatch_on_scripting(call),
            Decision::Buffered => {
                debug!(
                    "{}: buffered call {}.{} (state={})",
                    self.id,
                    module,
                    method,
                    self.register.current()
                );
            }
            Decision::Dropped => {
                debug!(
                    "{}: dropped call {}.{} (state={})",
                    self.id,
                    module,
                    method,
                    self.register.current()
                );
            }
        }
    }

    fn dispatch_on_scripting(self: &Arc<Self>, call: BufferedCall) {
        let shared = Arc::clone(self);
        let posted = self.contexts.scripting().post(move || {
            shared.invoke_engine(&call);
            Ok(())
        });
        if !posted {
            debug!("{}: dispatch dropped, scripting context closed", self.id);
        }
    }

    /// Runs `call` against the engine, routing failures per their
    /// fatality. No-op when the engine is already released.
    pub(crate) fn invoke_engine(&self, call: &BufferedCall) {
        let engine = self.engine.lock().clone();
        if let Some(engine) = engine {
            let result = engine.call_function(&call.module, &call.method, &call.args);
            if let Err(err) = result {
                let err = HostError::from(err);
                if err.is_fatal() {
                    self.fail(err);
                } else {
                    self.fire_on_error(err);
                }
            }
        }
    }

    /// Drains the buffered calls on the Scripting context.
    ///
    /// Single-flight: a drain claimed here blocks any second drain until
    /// it finishes, even across a debugger-wait re-entry. Two-phase per
    /// call - pop under the lock, dispatch outside it.
    pub(crate) fn drain_queued_calls(self: &Arc<Self>) {
        if !self.register.begin_drain() {
            debug!("{}: drain already in flight", self.id);
            return;
        }

        let shared = Arc::clone(self);
        let posted = self.contexts.scripting().post(move || {
            while let Some(call) = shared.register.pop_if_loaded() {
                shared.invoke_engine(&call);
            }
            shared.register.end_drain();
            Ok(())
        });
        if !posted {
            self.register.end_drain();
        }
    }

    /// Swaps the buffer out and destroys it outside the lock.
    pub(crate) fn abandon_queued_calls(&self) {
        let discarded = self.register.discard();
        if !discarded.is_empty() {
            debug!("{}: discarding {} buffered calls", self.id, discarded.len());
        }
        drop(discarded);
    }

    /// Completes the load attempt exactly once.
    ///
    /// Success transitions to `Loaded`, settles "loaded", and starts the
    /// drain; failure routes through [`fail`](Self::fail). Later
    /// completions (the cancellation guard, a raced error) are ignored.
    pub(crate) fn complete_load(self: &Arc<Self>, result: Result<(), HostError>) {
        if self.load_completed.swap(true, Ordering::AcqRel) {
            debug!("{}: load completion ignored, already completed", self.id);
            return;
        }

        match result {
            Ok(()) => {
                if self.register.transition_to(LifecycleState::Loaded) {
                    info!("{}: loaded", self.id);
                    self.when_loaded.settle(Ok(()));
                    self.drain_queued_calls();
                } else {
                    // A terminal transition raced ahead; that path owns
                    // settling "loaded".
                    debug!("{}: load completed after terminal state", self.id);
                }
            }
            Err(err) => self.fail(err),
        }
    }

    /// Terminal failure path.
    ///
    /// The compare-and-swap into `HasError` makes the transition - and
    /// its `on_error`/UI-refresh observations - happen once; repeat
    /// calls after a terminal state are state no-ops.
    pub(crate) fn fail(&self, err: HostError) {
        if self.register.transition_to(LifecycleState::HasError) {
            warn!("{}: failed: {}", self.id, err);
            self.abandon_queued_calls();
            self.when_loaded.settle(Err(err.clone()));
            self.fire_on_error(err);
            self.fire_update_ui();
        } else {
            debug!("{}: error after terminal state ignored: {}", self.id, err);
        }
    }

    /// Reports a non-fatal runtime error without touching state.
    pub(crate) fn fire_on_error(&self, err: HostError) {
        if let Some(on_error) = self.options.callbacks.on_error.clone() {
            let posted = self.contexts.control().post(move || {
                on_error(err);
                Ok(())
            });
            if !posted {
                debug!("{}: error callback dropped, control context closed", self.id);
            }
        }
    }

    pub(crate) fn fire_update_ui(&self) {
        if let Some(update_ui) = &self.options.callbacks.update_ui {
            update_ui();
        }
    }

    /// Fires the created callback. Must run on the Scripting context.
    pub(crate) fn fire_on_created(&self) {
        if let Some(on_created) = &self.options.callbacks.on_instance_created {
            on_created(self.id);
        }
    }

    /// Installs the collaborator-provided capabilities.
    pub(crate) fn install_capabilities(&self) {
        for spec in &self.collaborators.capabilities {
            self.capabilities
                .register(&spec.name, Arc::clone(&spec.provider), spec.async_only);
        }
        if !self.collaborators.capabilities.is_empty() {
            debug!(
                "{}: registered {} capabilities",
                self.id,
                self.collaborators.capabilities.len()
            );
        }
    }

    /// Debugger-wait hook: `Loading → WaitingForDebugger`.
    pub(crate) fn enter_debugger_wait(&self) {
        if self.register.transition_to(LifecycleState::WaitingForDebugger) {
            info!("{}: waiting for debugger", self.id);
            self.fire_update_ui();
        }
    }

    /// Debugger-attach hook: `WaitingForDebugger → Loading`.
    pub(crate) fn leave_debugger_wait(&self) {
        if self.register.transition_to(LifecycleState::Loading) {
            info!("{}: debugger attached", self.id);
            self.fire_update_ui();
        }
    }

    /// A development transport asked for a rebuild.
    pub(crate) fn request_reload(&self) {
        if let Some(on_reload) = &self.options.callbacks.on_reload_requested {
            on_reload(self.id);
        }
    }

    /// Forwards a process fault to the engine's diagnostic hook.
    pub(crate) fn record_fault(&self, detail: &str) {
        let engine = self.engine.lock().clone();
        if let Some(engine) = engine {
            engine.record_fault(detail);
        }
    }
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        // Abandoned without destroy(): external waiters must still
        // resolve, loaded strictly before destroyed.
        registry::unregister(self.id);
        self.contexts.close_all();
        self.when_loaded.try_cancel();
        self.when_destroyed.settle(Ok(()));
        debug!("{}: shared state dropped", self.id);
    }
}

/// A managed scripting runtime instance.
///
/// # Example
///
/// ```no_run
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use hearth_host::{Collaborators, InstanceOptions, ScriptInstance};
/// use hearth_engine::testing::{ScriptedHolder, StaticLoader};
/// use hearth_engine::Script;
/// use serde_json::json;
///
/// let holder = ScriptedHolder::succeeding();
/// let loader = StaticLoader::with_script(Script::new("main.bundle", b"...".to_vec()));
///
/// let instance = ScriptInstance::new(
///     InstanceOptions::new("main.bundle"),
///     Collaborators::new(holder, loader),
/// );
/// instance.initialize();
///
/// // Calls issued before the bundle finished loading are buffered and
/// // replayed in order once the instance is loaded.
/// instance.call_function("App", "start", vec![json!({})]);
///
/// instance.when_loaded().wait().await.unwrap();
/// let destroyed = instance.destroy();
/// destroyed.wait().await.unwrap();
/// # });
/// ```
pub struct ScriptInstance {
    shared: Arc<InstanceShared>,
}

impl ScriptInstance {
    /// Creates an instance and registers it with the process registry.
    ///
    /// The "created" promise settles immediately; the
    /// `on_instance_created` callback fires later, on the Scripting
    /// context, once the engine exists. Must be called within a tokio
    /// runtime (the context queues spawn their workers here).
    #[must_use]
    pub fn new(options: InstanceOptions, collaborators: Collaborators) -> Self {
        let id = InstanceId::new();

        // Queue-boundary failures resolve the instance through the
        // registry: once the instance is gone they fall through.
        let error_hook = Arc::new(move |err: HostError| {
            if let Some(shared) = registry::resolve(id) {
                shared.fail(err);
            }
        });
        let contexts = ContextSet::spawn(error_hook, collaborators.notifications.clone());

        let shared = Arc::new(InstanceShared {
            id,
            options,
            collaborators,
            contexts,
            register: StateRegister::new(),
            engine: Mutex::new(None),
            capabilities: CapabilityRegistry::new(),
            when_created: OncePromise::new(),
            when_loaded: OncePromise::new(),
            when_destroyed: OncePromise::new(),
            load_completed: AtomicBool::new(false),
            destroy_started: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        });

        // Loaded callback chain: fires inline at settle time, success or
        // cancellation-tagged, and therefore always before the destroyed
        // callback below.
        if let Some(on_loaded) = shared.options.callbacks.on_instance_loaded.clone() {
            shared.when_loaded.on_settle_inline(move |result| {
                on_loaded(id, result.err());
            });
        }
        if let Some(on_destroyed) = shared.options.callbacks.on_instance_destroyed.clone() {
            shared.when_destroyed.on_settle_inline(move |_| {
                on_destroyed(id);
            });
        }

        registry::register(id, Arc::downgrade(&shared));

        // The host may schedule work as soon as construction returns.
        shared.when_created.settle(Ok(()));
        info!("{}: instance created", id);

        Self { shared }
    }

    /// This instance's stable id.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.shared.id
    }

    /// Non-blocking lifecycle state read.
    #[must_use]
    pub fn current_state(&self) -> LifecycleState {
        self.shared.register.current()
    }

    /// Returns `true` once the runtime is live.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.current_state() == LifecycleState::Loaded
    }

    /// Starts the bootstrap sequence.
    ///
    /// Idempotent; the second and later calls are ignored.
    pub fn initialize(&self) {
        if self.shared.initialized.swap(true, Ordering::AcqRel) {
            warn!("{}: initialize called twice, ignored", self.shared.id);
            return;
        }
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            bootstrap::run(shared).await;
        });
    }

    /// Issues (or buffers, or drops) a call into the runtime.
    ///
    /// Calls preserve their issue order relative to one another; calls
    /// issued before the instance loaded replay FIFO at the load
    /// transition.
    pub fn call_function(&self, module: &str, method: &str, args: Vec<Value>) {
        self.shared.call_function(module, method, args);
    }

    /// Routes an event to a target through the runtime's event emitter.
    ///
    /// Inherits the buffering and drop semantics of
    /// [`call_function`](Self::call_function), so cross-module events
    /// keep their order relative to ordinary calls.
    pub fn dispatch_event(&self, target_id: i64, name: &str, data: Value) {
        let args = vec![json!(target_id), json!(name), data];
        self.call_function(EVENT_EMITTER_MODULE, EVENT_EMITTER_METHOD, args);
    }

    /// Tears the instance down.
    ///
    /// Idempotent: every call returns a handle to the same "destroyed"
    /// completion. Intended to be called from the host-control side;
    /// calls that race only trigger one teardown.
    pub fn destroy(&self) -> DestroyedHandle {
        teardown::destroy(&self.shared)
    }

    /// Fires the reload-request callback.
    pub fn request_reload(&self) {
        self.shared.request_reload();
    }

    /// The capability registry the runtime resolves modules from.
    ///
    /// Populated during bootstrap, cleared by teardown.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.shared.capabilities
    }

    /// Promise settled when construction completed.
    #[must_use]
    pub fn when_created(&self) -> OncePromise<()> {
        self.shared.when_created.clone()
    }

    /// Promise settled when the bundle loaded (or failed/cancelled).
    #[must_use]
    pub fn when_loaded(&self) -> OncePromise<()> {
        self.shared.when_loaded.clone()
    }

    /// Promise settled when teardown completed.
    #[must_use]
    pub fn when_destroyed(&self) -> OncePromise<()> {
        self.shared.when_destroyed.clone()
    }
}

impl std::fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("id", &self.shared.id)
            .field("state", &self.shared.register.current())
            .finish()
    }
}
