//! Test doubles for the engine-side collaborators.
//!
//! These are used by the host crate's unit and integration tests, and
//! are useful for embedders testing their own wiring without a real
//! scripting runtime.
//!
//! - [`RecordingEngine`] - records every call and loaded script
//! - [`ScriptedHolder`] - construction capability with scripted outcomes
//! - [`StaticLoader`] - loader returning a fixed result
//! - [`PendingLoader`] - loader whose async completion is fired manually
//! - [`RecordingSink`] - notification sink that records event names
//!
//! # Example
//!
//! ```
//! use hearth_engine::testing::{RecordingEngine, ScriptedHolder};
//! use hearth_engine::{EngineConfig, RuntimeHolder, ScriptEngine};
//! use serde_json::json;
//!
//! let holder = ScriptedHolder::succeeding();
//! let engine = holder.create_engine(&EngineConfig::default()).unwrap();
//! engine.call_function("App", "run", &[json!(1)]).unwrap();
//!
//! assert_eq!(holder.engine().call_count(), 1);
//! ```

use crate::engine::{EngineConfig, RuntimeHolder, ScriptEngine};
use crate::error::EngineError;
use crate::loader::{BundleLoader, LoadCompletion, Script};
use crate::notify::NotificationSink;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A recorded call into a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Target module name.
    pub module: String,
    /// Target method name.
    pub method: String,
    /// Arguments, in order.
    pub args: Vec<Value>,
}

/// Engine double that records every interaction.
///
/// Dispatch counting is the probe the ordering and terminal-drop tests
/// are built on: if the host drops a call, the count stays put.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<RecordedCall>>,
    scripts: Mutex<Vec<String>>,
    faults: Mutex<Vec<String>>,
    fail_calls: AtomicBool,
}

impl RecordingEngine {
    /// Creates an engine that accepts all calls.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes subsequent `call_function` invocations fail (non-fatal).
    pub fn fail_next_calls(&self, fail: bool) {
        self.fail_calls.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of dispatched calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns a copy of the recorded calls, in dispatch order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the source urls of the scripts loaded so far.
    #[must_use]
    pub fn loaded_scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    /// Returns the fault details recorded so far.
    #[must_use]
    pub fn faults(&self) -> Vec<String> {
        self.faults.lock().clone()
    }
}

impl ScriptEngine for RecordingEngine {
    fn call_function(
        &self,
        module: &str,
        method: &str,
        args: &[Value],
    ) -> Result<(), EngineError> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(EngineError::CallFailed {
                module: module.to_string(),
                method: method.to_string(),
                message: "scripted failure".to_string(),
                fatal: false,
            });
        }
        self.calls.lock().push(RecordedCall {
            module: module.to_string(),
            method: method.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn load_script(&self, script: Script) -> Result<(), EngineError> {
        self.scripts.lock().push(script.source_url);
        Ok(())
    }

    fn record_fault(&self, detail: &str) {
        self.faults.lock().push(detail.to_string());
    }
}

/// Scripted outcome for [`ScriptedHolder`].
enum HolderOutcome {
    Succeed,
    Fail(EngineError),
}

/// Construction capability with a scripted outcome.
///
/// On success it always hands out the same shared [`RecordingEngine`],
/// so tests can keep a probe on the engine after the host took
/// ownership. With `simulate_debugger_wait` it fires the config's
/// waiting/attached hooks in order before returning, the way a real
/// holder brackets its inspector wait.
pub struct ScriptedHolder {
    engine: Arc<RecordingEngine>,
    outcome: Mutex<HolderOutcome>,
    simulate_debugger_wait: AtomicBool,
    construct_count: Mutex<usize>,
}

impl ScriptedHolder {
    /// Creates a holder whose construction succeeds.
    #[must_use]
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            engine: RecordingEngine::new(),
            outcome: Mutex::new(HolderOutcome::Succeed),
            simulate_debugger_wait: AtomicBool::new(false),
            construct_count: Mutex::new(0),
        })
    }

    /// Creates a holder whose construction fails with `err`.
    #[must_use]
    pub fn failing(err: EngineError) -> Arc<Self> {
        Arc::new(Self {
            engine: RecordingEngine::new(),
            outcome: Mutex::new(HolderOutcome::Fail(err)),
            simulate_debugger_wait: AtomicBool::new(false),
            construct_count: Mutex::new(0),
        })
    }

    /// Makes construction bracket a simulated debugger wait.
    pub fn set_simulate_debugger_wait(&self, simulate: bool) {
        self.simulate_debugger_wait.store(simulate, Ordering::SeqCst);
    }

    /// Returns the shared engine probe.
    #[must_use]
    pub fn engine(&self) -> Arc<RecordingEngine> {
        Arc::clone(&self.engine)
    }

    /// Returns how many times `create_engine` ran.
    #[must_use]
    pub fn construct_count(&self) -> usize {
        *self.construct_count.lock()
    }
}

impl RuntimeHolder for ScriptedHolder {
    fn create_engine(&self, config: &EngineConfig) -> Result<Arc<dyn ScriptEngine>, EngineError> {
        *self.construct_count.lock() += 1;

        if self.simulate_debugger_wait.load(Ordering::SeqCst) {
            config.notify_waiting_for_debugger();
            config.notify_debugger_attached();
        }

        match &*self.outcome.lock() {
            HolderOutcome::Succeed => Ok(Arc::clone(&self.engine) as Arc<dyn ScriptEngine>),
            HolderOutcome::Fail(err) => Err(err.clone()),
        }
    }
}

/// Loader returning a fixed result for both modes.
pub struct StaticLoader {
    result: Mutex<Result<Script, EngineError>>,
}

impl StaticLoader {
    /// Creates a loader that returns `script`.
    #[must_use]
    pub fn with_script(script: Script) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Ok(script)),
        })
    }

    /// Creates a loader that fails with `err`.
    #[must_use]
    pub fn failing(err: EngineError) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err(err)),
        })
    }
}

impl BundleLoader for StaticLoader {
    fn load_sync(&self, _path: &str) -> Result<Script, EngineError> {
        self.result.lock().clone()
    }

    fn load_async(&self, path: &str, done: LoadCompletion) {
        done(self.load_sync(path));
    }
}

/// Loader whose async completion is held until the test releases it.
///
/// `load_async` parks the completion; the test later calls
/// [`complete`](Self::complete) to deliver a result, or drops the loader
/// to model a fetch that never finishes. `load_sync` delegates to a
/// fixed result like [`StaticLoader`].
pub struct PendingLoader {
    sync_result: Mutex<Result<Script, EngineError>>,
    pending: Mutex<Option<LoadCompletion>>,
}

impl PendingLoader {
    /// Creates a pending loader whose sync mode returns `script`.
    #[must_use]
    pub fn with_script(script: Script) -> Arc<Self> {
        Arc::new(Self {
            sync_result: Mutex::new(Ok(script)),
            pending: Mutex::new(None),
        })
    }

    /// Returns `true` if an async load is parked.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Delivers `result` to the parked completion.
    ///
    /// Returns `false` if no load was pending.
    pub fn complete(&self, result: Result<Script, EngineError>) -> bool {
        match self.pending.lock().take() {
            Some(done) => {
                done(result);
                true
            }
            None => false,
        }
    }
}

impl BundleLoader for PendingLoader {
    fn load_sync(&self, _path: &str) -> Result<Script, EngineError> {
        self.sync_result.lock().clone()
    }

    fn load_async(&self, _path: &str, done: LoadCompletion) {
        *self.pending.lock() = Some(done);
    }
}

/// Notification sink that records event names in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the recorded event names.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &str) {
        self.events.lock().push(event.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recording_engine_preserves_order() {
        let engine = RecordingEngine::new();
        engine.call_function("A", "first", &[]).unwrap();
        engine.call_function("A", "second", &[json!(2)]).unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, "first");
        assert_eq!(calls[1].method, "second");
        assert_eq!(calls[1].args, vec![json!(2)]);
    }

    #[test]
    fn recording_engine_scripted_failure() {
        let engine = RecordingEngine::new();
        engine.fail_next_calls(true);

        let err = engine.call_function("A", "b", &[]).unwrap_err();
        assert!(matches!(err, EngineError::CallFailed { fatal: false, .. }));
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn scripted_holder_succeeds_with_shared_engine() {
        let holder = ScriptedHolder::succeeding();
        let engine = holder.create_engine(&EngineConfig::default()).unwrap();
        engine.call_function("M", "f", &[]).unwrap();

        assert_eq!(holder.engine().call_count(), 1);
        assert_eq!(holder.construct_count(), 1);
    }

    #[test]
    fn scripted_holder_failure() {
        let holder = ScriptedHolder::failing(EngineError::ConstructionFailed("nope".into()));
        let err = holder.create_engine(&EngineConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::ConstructionFailed(_)));
    }

    #[test]
    fn scripted_holder_debugger_bracketing() {
        let holder = ScriptedHolder::succeeding();
        holder.set_simulate_debugger_wait(true);

        let order = Arc::new(Mutex::new(Vec::new()));

        let config = EngineConfig {
            on_waiting_for_debugger: Some({
                let order = Arc::clone(&order);
                Arc::new(move || order.lock().push("wait"))
            }),
            on_debugger_attached: Some({
                let order = Arc::clone(&order);
                Arc::new(move || order.lock().push("attach"))
            }),
            ..EngineConfig::default()
        };

        holder.create_engine(&config).unwrap();
        assert_eq!(*order.lock(), vec!["wait", "attach"]);
    }

    #[test]
    fn pending_loader_parks_completion() {
        let loader = PendingLoader::with_script(Script::new("main", b"x".to_vec()));
        let (tx, rx) = std::sync::mpsc::channel();

        loader.load_async(
            "main",
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
        );
        assert!(loader.has_pending());
        assert!(rx.try_recv().is_err());

        assert!(loader.complete(Ok(Script::new("main", b"x".to_vec()))));
        assert!(rx.recv().unwrap().is_ok());
        assert!(!loader.has_pending());
    }

    #[test]
    fn recording_sink_records_in_order() {
        let sink = RecordingSink::new();
        sink.notify("a");
        sink.notify("b");
        assert_eq!(sink.events(), vec!["a", "b"]);
    }
}
