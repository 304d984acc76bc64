//! Engine construction and call contracts.
//!
//! The host never constructs a scripting runtime directly. It hands an
//! [`EngineConfig`] to a pluggable [`RuntimeHolder`] on the Scripting
//! context and receives a live [`ScriptEngine`] back. From then on the
//! engine is only ever exercised on that same context, so implementations
//! do not need internal synchronization for the call surface.

use crate::error::EngineError;
use serde_json::Value;
use std::sync::Arc;

/// Hook invoked by a runtime holder around debugger attachment.
pub type DebuggerHook = Arc<dyn Fn() + Send + Sync>;

/// Configuration handed to [`RuntimeHolder::create_engine`].
///
/// Carries the bundle identity, the developer-mode flags, and the
/// debugger hooks the holder fires while it blocks waiting for an
/// inspector to attach. The hooks are optional; holders that do not
/// support debugging simply never call them.
#[derive(Clone, Default)]
pub struct EngineConfig {
    /// Identity of the script bundle this engine will run.
    pub bundle_identity: String,
    /// Reload script changes through a development transport.
    pub use_fast_refresh: bool,
    /// Attach a remote debugger before executing script.
    pub use_remote_debugger: bool,
    /// Break on the first script statement once a debugger attached.
    pub debugger_break_on_next_line: bool,
    /// Port the inspector listens on.
    pub debugger_port: u16,
    /// Fired when the holder starts waiting for a debugger.
    pub on_waiting_for_debugger: Option<DebuggerHook>,
    /// Fired when a debugger attached (or the wait timed out).
    pub on_debugger_attached: Option<DebuggerHook>,
}

impl EngineConfig {
    /// Signals that the holder entered its debugger wait.
    pub fn notify_waiting_for_debugger(&self) {
        if let Some(hook) = &self.on_waiting_for_debugger {
            hook();
        }
    }

    /// Signals that the debugger wait ended.
    pub fn notify_debugger_attached(&self) {
        if let Some(hook) = &self.on_debugger_attached {
            hook();
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("bundle_identity", &self.bundle_identity)
            .field("use_fast_refresh", &self.use_fast_refresh)
            .field("use_remote_debugger", &self.use_remote_debugger)
            .field(
                "debugger_break_on_next_line",
                &self.debugger_break_on_next_line,
            )
            .field("debugger_port", &self.debugger_port)
            .finish_non_exhaustive()
    }
}

/// A live scripting runtime.
///
/// Produced once per instance by a [`RuntimeHolder`] and exclusively
/// released by the teardown sequencer. All methods are invoked on the
/// Scripting context only.
pub trait ScriptEngine: Send + Sync {
    /// Invokes `module.method(args)` inside the runtime.
    fn call_function(&self, module: &str, method: &str, args: &[Value])
        -> Result<(), EngineError>;

    /// Evaluates a loaded script bundle.
    fn load_script(&self, script: crate::loader::Script) -> Result<(), EngineError>;

    /// Records diagnostic state for an in-flight process fault.
    ///
    /// Called from the fault registry fan-out; must not allocate or
    /// block more than necessary. Default is a no-op.
    fn record_fault(&self, _detail: &str) {}
}

/// Engine construction capability.
///
/// Invoked exactly once per instance, on the Scripting context. A holder
/// may spawn its own inspector session; it reports debugger progress
/// through the hooks on [`EngineConfig`].
pub trait RuntimeHolder: Send + Sync {
    /// Constructs the engine for `config`.
    fn create_engine(&self, config: &EngineConfig) -> Result<Arc<dyn ScriptEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn config_hooks_fire_when_present() {
        let waits = Arc::new(AtomicUsize::new(0));
        let attaches = Arc::new(AtomicUsize::new(0));

        let config = EngineConfig {
            on_waiting_for_debugger: Some({
                let waits = Arc::clone(&waits);
                Arc::new(move || {
                    waits.fetch_add(1, Ordering::SeqCst);
                })
            }),
            on_debugger_attached: Some({
                let attaches = Arc::clone(&attaches);
                Arc::new(move || {
                    attaches.fetch_add(1, Ordering::SeqCst);
                })
            }),
            ..EngineConfig::default()
        };

        config.notify_waiting_for_debugger();
        config.notify_waiting_for_debugger();
        config.notify_debugger_attached();

        assert_eq!(waits.load(Ordering::SeqCst), 2);
        assert_eq!(attaches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_hooks_absent_is_noop() {
        let config = EngineConfig::default();
        config.notify_waiting_for_debugger();
        config.notify_debugger_attached();
    }

    #[test]
    fn debug_omits_hooks() {
        let config = EngineConfig {
            bundle_identity: "main".into(),
            ..EngineConfig::default()
        };
        let repr = format!("{config:?}");
        assert!(repr.contains("main"));
        assert!(!repr.contains("on_waiting"));
    }
}
