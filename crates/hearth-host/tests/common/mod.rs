//! Shared helpers for the host integration tests.

#![allow(dead_code)]

use hearth_engine::testing::{PendingLoader, ScriptedHolder, StaticLoader};
use hearth_engine::Script;
use hearth_host::{Collaborators, HostCallbacks, HostError, InstanceOptions};
use hearth_types::InstanceId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default bundle identity used by the tests.
pub const BUNDLE: &str = "main.bundle";

/// Installs a fmt subscriber so `RUST_LOG=hearth_host=debug` shows the
/// host traces while debugging a flaky interleaving.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every host callback observation.
#[derive(Default)]
pub struct CallbackProbe {
    /// Callback firing order: "created", "loaded", "destroyed".
    pub order: Mutex<Vec<String>>,
    /// Outcome passed to each loaded callback.
    pub loaded_errors: Mutex<Vec<Option<HostError>>>,
    /// `on_error` firings.
    pub errors: Mutex<Vec<HostError>>,
    /// `update_ui` firings.
    pub ui_refreshes: AtomicUsize,
    /// Reload requests.
    pub reloads: Mutex<Vec<InstanceId>>,
}

impl CallbackProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds the callback set feeding this probe.
    pub fn callbacks(self: &Arc<Self>) -> HostCallbacks {
        let created = Arc::clone(self);
        let loaded = Arc::clone(self);
        let destroyed = Arc::clone(self);
        let errored = Arc::clone(self);
        let refreshed = Arc::clone(self);
        let reloaded = Arc::clone(self);

        HostCallbacks {
            on_instance_created: Some(Arc::new(move |_| {
                created.order.lock().unwrap().push("created".into());
            })),
            on_instance_loaded: Some(Arc::new(move |_, err| {
                loaded.order.lock().unwrap().push("loaded".into());
                loaded.loaded_errors.lock().unwrap().push(err);
            })),
            on_instance_destroyed: Some(Arc::new(move |_| {
                destroyed.order.lock().unwrap().push("destroyed".into());
            })),
            on_error: Some(Arc::new(move |err| {
                errored.errors.lock().unwrap().push(err);
            })),
            update_ui: Some(Arc::new(move || {
                refreshed.ui_refreshes.fetch_add(1, Ordering::SeqCst);
            })),
            on_reload_requested: Some(Arc::new(move |id| {
                reloaded.reloads.lock().unwrap().push(id);
            })),
        }
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.order
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn loaded_errors(&self) -> Vec<Option<HostError>> {
        self.loaded_errors.lock().unwrap().clone()
    }
}

/// Options wired to `probe` with all flags off.
pub fn probed_options(probe: &Arc<CallbackProbe>) -> InstanceOptions {
    let mut options = InstanceOptions::new(BUNDLE);
    options.callbacks = probe.callbacks();
    options
}

/// A succeeding holder plus a sync loader for `BUNDLE`.
pub fn sync_collaborators() -> (Arc<ScriptedHolder>, Collaborators) {
    let holder = ScriptedHolder::succeeding();
    let loader = StaticLoader::with_script(Script::new(BUNDLE, b"bundle".to_vec()));
    let collaborators = Collaborators::new(holder.clone(), loader);
    (holder, collaborators)
}

/// A succeeding holder plus a manually-completed async loader.
pub fn pending_collaborators() -> (Arc<ScriptedHolder>, Arc<PendingLoader>, Collaborators) {
    let holder = ScriptedHolder::succeeding();
    let loader = PendingLoader::with_script(Script::new(BUNDLE, b"bundle".to_vec()));
    let collaborators = Collaborators::new(holder.clone(), loader.clone());
    (holder, loader, collaborators)
}

/// Polls `condition` until it holds or two seconds elapse.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
