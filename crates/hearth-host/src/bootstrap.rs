//! Bootstrap sequencing.
//!
//! Drives `Loading → (WaitingForDebugger ⇄ Loading)* → Loaded | HasError`
//! across the three contexts:
//!
//! 1. Presentation: acquire UI-affine resources (fatal on failure)
//! 2. Control: assemble the engine configuration (pure)
//! 3. Scripting (one synchronous round-trip): construct the engine,
//!    install capability bindings, optionally sit in the debugger wait
//! 4. Issue the bundle-load request, sync or async per the developer
//!    flags
//! 5. On completion, transition and settle "loaded"; drain the buffer
//!    only on success
//!
//! Two sequencer variants implement the same trait and are selected at
//! runtime by [`EngineMode`]: [`ProxiedBootstrap`] installs capability
//! bindings from the Control context before the engine exists and fires
//! the created notification in a separate scripting task;
//! [`DirectBootstrap`] does registration, construction, and the created
//! notification in a single scripting task.
//!
//! Every step error is contained at a context boundary and funneled into
//! the step-5 failure path; nothing escapes a queue worker. The
//! [`LoadGuard`] makes abandonment safe: if the scripting context throws
//! the load job away unexecuted, the guard's drop still force-settles
//! "loaded" with a cancellation error.

use crate::error::HostError;
use crate::instance::InstanceShared;
use crate::options::EngineMode;
use crate::registry;
use crate::state::LifecycleState;
use hearth_engine::{EngineConfig, Script};
use serde_json::json;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Ensures the "loaded" notification always fires.
///
/// Dropped without a prior load completion - because the scripting
/// context discarded the load job, or the loader dropped its completion
/// callback - it reports a cancellation, which the settle-once load path
/// ignores whenever a real completion got there first.
///
/// Holds a weak reference: a completion parked inside an external
/// loader must not keep the instance alive, or an abandoned instance
/// could never drop and its promises would never resolve.
struct LoadGuard {
    shared: Weak<InstanceShared>,
}

impl LoadGuard {
    fn new(shared: &Arc<InstanceShared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.complete_load(Err(HostError::Cancelled));
        }
    }
}

/// One bootstrap strategy.
pub(crate) trait BootstrapSequencer {
    /// Runs the whole sequence for `shared`.
    async fn run(&self, shared: Arc<InstanceShared>);
}

/// Selects and runs the configured sequencer variant.
pub(crate) async fn run(shared: Arc<InstanceShared>) {
    match shared.options.engine_mode {
        EngineMode::Proxied => ProxiedBootstrap.run(shared).await,
        EngineMode::Direct => DirectBootstrap.run(shared).await,
    }
}

/// Bridge-style bootstrap: capability bindings are installed through
/// the proxy layer on the Control context, then the engine comes up in
/// its own Scripting round-trip.
pub(crate) struct ProxiedBootstrap;

impl BootstrapSequencer for ProxiedBootstrap {
    async fn run(&self, shared: Arc<InstanceShared>) {
        info!("{}: bootstrap started (proxied)", shared.id);

        let prepared: Result<(), HostError> = async {
            acquire_presentation(&shared).await?;
            let config = assemble_config(&shared).await?;

            // Proxy side first: bindings exist before the engine does.
            let s = Arc::clone(&shared);
            shared
                .contexts
                .control()
                .run_and_wait(move || {
                    s.install_capabilities();
                    Ok(())
                })
                .await?;

            construct_engine(&shared, config).await?;

            // Created notification in its own scripting task, ahead of
            // any bundle execution.
            let s = Arc::clone(&shared);
            shared.contexts.scripting().post(move || {
                s.fire_on_created();
                Ok(())
            });
            Ok(())
        }
        .await;

        finish(&shared, prepared);
    }
}

/// Direct bootstrap: registration, construction, and the created
/// notification happen in one Scripting-context task.
pub(crate) struct DirectBootstrap;

impl BootstrapSequencer for DirectBootstrap {
    async fn run(&self, shared: Arc<InstanceShared>) {
        info!("{}: bootstrap started (direct)", shared.id);

        let prepared: Result<(), HostError> = async {
            acquire_presentation(&shared).await?;
            let config = assemble_config(&shared).await?;

            let s = Arc::clone(&shared);
            shared
                .contexts
                .scripting()
                .run_and_wait(move || {
                    s.install_capabilities();
                    let engine = s
                        .collaborators
                        .holder
                        .create_engine(&config)
                        .map_err(HostError::from)?;
                    *s.engine.lock() = Some(engine);
                    s.fire_on_created();
                    Ok(())
                })
                .await?;
            Ok(())
        }
        .await;

        finish(&shared, prepared);
    }
}

/// Routes the preparation outcome into load issuance or the failure
/// path.
fn finish(shared: &Arc<InstanceShared>, prepared: Result<(), HostError>) {
    match prepared {
        Ok(()) => {
            issue_load(shared);
            setup_fast_refresh(shared);
        }
        Err(err) => shared.fail(err),
    }
}

/// Step 1: presentation-context resources. Failure is fatal, no retry.
async fn acquire_presentation(shared: &Arc<InstanceShared>) -> Result<(), HostError> {
    shared
        .contexts
        .presentation()
        .run_and_wait(|| Ok(()))
        .await
        .map_err(|_| HostError::Configuration("presentation context unavailable".to_string()))
}

/// Step 2: assemble the engine configuration on the Control context.
///
/// Pure and non-failing apart from the context itself being gone. The
/// debugger hooks capture the instance id only and resolve it through
/// the registry when fired.
async fn assemble_config(shared: &Arc<InstanceShared>) -> Result<EngineConfig, HostError> {
    let id = shared.id;
    let options = shared.options.clone();

    shared
        .contexts
        .control()
        .run_and_wait(move || {
            let mut config = EngineConfig {
                bundle_identity: options.bundle_identity.clone(),
                use_fast_refresh: options.use_fast_refresh,
                use_remote_debugger: options.use_remote_debugger,
                debugger_break_on_next_line: options.debugger_break_on_next_line,
                debugger_port: options.debugger_port,
                on_waiting_for_debugger: None,
                on_debugger_attached: None,
            };
            if options.use_remote_debugger {
                config.on_waiting_for_debugger = Some(Arc::new(move || {
                    if let Some(shared) = registry::resolve(id) {
                        shared.enter_debugger_wait();
                    }
                }));
                config.on_debugger_attached = Some(Arc::new(move || {
                    if let Some(shared) = registry::resolve(id) {
                        shared.leave_debugger_wait();
                    }
                }));
            }
            Ok(config)
        })
        .await
}

/// Step 3 (proxied variant): engine construction in its own Scripting
/// round-trip.
async fn construct_engine(
    shared: &Arc<InstanceShared>,
    config: EngineConfig,
) -> Result<(), HostError> {
    let s = Arc::clone(shared);
    shared
        .contexts
        .scripting()
        .run_and_wait(move || {
            let engine = s
                .collaborators
                .holder
                .create_engine(&config)
                .map_err(HostError::from)?;
            *s.engine.lock() = Some(engine);
            Ok(())
        })
        .await
}

/// Step 4: issue the bundle-load request.
///
/// Sync mode blocks the Scripting context through the whole load; async
/// mode starts the fetch and re-posts the completion onto the Scripting
/// context. Either way the [`LoadGuard`] travels with the work so an
/// unexecuted job still resolves "loaded".
fn issue_load(shared: &Arc<InstanceShared>) {
    let path = shared.options.bundle_identity.clone();
    let guard = LoadGuard::new(shared);

    if shared.options.loads_async() {
        debug!("{}: loading bundle async: {}", shared.id, path);
        // The completion may sit inside the loader indefinitely, so it
        // must not hold the instance alive.
        let weak = Arc::downgrade(shared);
        let scripting = shared.contexts.scripting().clone();
        shared.collaborators.loader.load_async(
            &path,
            Box::new(move |result| {
                let delivered = scripting.post(move || {
                    let _guard = guard;
                    if let Some(s) = weak.upgrade() {
                        match result {
                            Ok(script) => s.evaluate_and_complete(script),
                            Err(err) => s.complete_load(Err(err.into())),
                        }
                    }
                    Ok(())
                });
                if !delivered {
                    debug!("bundle completion dropped, scripting context closed");
                }
            }),
        );
    } else {
        debug!("{}: loading bundle sync: {}", shared.id, path);
        let s = Arc::clone(shared);
        shared.contexts.scripting().post(move || {
            let _guard = guard;
            match s.collaborators.loader.load_sync(&path) {
                Ok(script) => s.evaluate_and_complete(script),
                Err(err) => s.complete_load(Err(err.into())),
            }
            Ok(())
        });
    }
}

impl InstanceShared {
    /// Evaluates a loaded script and reports load completion.
    ///
    /// Runs on the Scripting context. If a failure already terminated
    /// the instance the success report is withheld; the failure path
    /// owns the "loaded" settlement.
    pub(crate) fn evaluate_and_complete(self: &Arc<Self>, script: Script) {
        let engine = self.engine.lock().clone();
        let Some(engine) = engine else {
            self.complete_load(Err(HostError::Cancelled));
            return;
        };

        match engine.load_script(script) {
            Ok(()) => {
                if self.register.current() != LifecycleState::HasError {
                    self.complete_load(Ok(()));
                }
            }
            Err(err) => self.complete_load(Err(err.into())),
        }
    }
}

/// Post-load developer tooling: ask the runtime to set up its
/// fast-refresh client.
///
/// Issued right after the load request, so it lands in the call buffer
/// and replays once the instance is loaded - the same ordering any other
/// early call gets.
fn setup_fast_refresh(shared: &Arc<InstanceShared>) {
    if !shared.options.developer_support()
        || shared.register.current() == LifecycleState::HasError
    {
        return;
    }

    let args = vec![
        json!(shared.options.bundle_identity),
        json!(shared.options.debugger_port),
        json!(shared.options.use_fast_refresh),
    ];
    shared.call_function("FastRefresh", "setup", args);
}
