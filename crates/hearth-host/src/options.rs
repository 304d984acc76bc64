//! Instance configuration and host callbacks.
//!
//! [`InstanceOptions`] carries the data-only configuration (bundle
//! identity, developer flags, engine wiring mode) plus the host
//! callback set. [`Collaborators`] bundles the external capabilities
//! the instance consumes: the runtime holder, the bundle loader, the
//! capability providers to install during bootstrap, and an optional
//! notification sink.

use crate::error::HostError;
use hearth_engine::{BundleLoader, CapabilityProvider, NotificationSink, RuntimeHolder};
use hearth_types::InstanceId;
use std::sync::Arc;

/// Callback receiving the instance id.
pub type InstanceCallback = Arc<dyn Fn(InstanceId) + Send + Sync>;

/// Callback receiving the instance id and the load outcome.
pub type LoadedCallback = Arc<dyn Fn(InstanceId, Option<HostError>) + Send + Sync>;

/// Callback receiving a host error.
pub type ErrorCallback = Arc<dyn Fn(HostError) + Send + Sync>;

/// Fire-and-forget UI refresh hook.
pub type UiRefreshHook = Arc<dyn Fn() + Send + Sync>;

/// How the engine is wired during bootstrap.
///
/// Both variants are selected at runtime so both stay testable in one
/// binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Capability bindings are installed from the Control context
    /// before the engine exists; the engine is then constructed in its
    /// own Scripting round-trip.
    #[default]
    Proxied,
    /// Registration, construction, and the created notification all
    /// happen in a single Scripting-context task.
    Direct,
}

/// Host callback set.
///
/// `on_instance_created`, `on_instance_loaded`, and
/// `on_instance_destroyed` each fire at most once per instance;
/// `on_error` fires once per failure transition and once per reported
/// runtime error.
#[derive(Clone, Default)]
pub struct HostCallbacks {
    /// The engine exists and is accepting work.
    pub on_instance_created: Option<InstanceCallback>,
    /// The bundle finished loading (`None`) or failed/cancelled (`Some`).
    pub on_instance_loaded: Option<LoadedCallback>,
    /// Teardown completed; the engine is released.
    pub on_instance_destroyed: Option<InstanceCallback>,
    /// A failure occurred. Fires on the single terminal transition and
    /// on each reported runtime error afterwards.
    pub on_error: Option<ErrorCallback>,
    /// UI refresh trigger, fired on error and debugger-wait changes.
    pub update_ui: Option<UiRefreshHook>,
    /// A development transport asked for the instance to be rebuilt.
    pub on_reload_requested: Option<InstanceCallback>,
}

impl std::fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("on_instance_created", &self.on_instance_created.is_some())
            .field("on_instance_loaded", &self.on_instance_loaded.is_some())
            .field(
                "on_instance_destroyed",
                &self.on_instance_destroyed.is_some(),
            )
            .field("on_error", &self.on_error.is_some())
            .field("update_ui", &self.update_ui.is_some())
            .field("on_reload_requested", &self.on_reload_requested.is_some())
            .finish()
    }
}

/// Configuration for one hosted instance.
#[derive(Clone, Debug)]
pub struct InstanceOptions {
    /// Identity (and load path) of the main script bundle.
    pub bundle_identity: String,
    /// Reload script changes through a development transport.
    ///
    /// Also selects the asynchronous bundle-load path.
    pub use_fast_refresh: bool,
    /// Attach a remote debugger before executing script.
    ///
    /// Also selects the asynchronous bundle-load path.
    pub use_remote_debugger: bool,
    /// Break on the first script statement once a debugger attached.
    pub debugger_break_on_next_line: bool,
    /// Port the inspector listens on.
    pub debugger_port: u16,
    /// Engine wiring variant used by bootstrap.
    pub engine_mode: EngineMode,
    /// Host callback set.
    pub callbacks: HostCallbacks,
}

impl InstanceOptions {
    /// Creates options for the given bundle with all flags off.
    #[must_use]
    pub fn new(bundle_identity: impl Into<String>) -> Self {
        Self {
            bundle_identity: bundle_identity.into(),
            use_fast_refresh: false,
            use_remote_debugger: false,
            debugger_break_on_next_line: false,
            debugger_port: 0,
            engine_mode: EngineMode::default(),
            callbacks: HostCallbacks::default(),
        }
    }

    /// Returns `true` when any developer-facing feature is on.
    #[must_use]
    pub fn developer_support(&self) -> bool {
        self.use_fast_refresh || self.use_remote_debugger
    }

    /// Returns `true` when the bundle loads asynchronously.
    ///
    /// Development transports deliver the bundle out-of-band, so both
    /// developer modes take the asynchronous path.
    #[must_use]
    pub fn loads_async(&self) -> bool {
        self.use_fast_refresh || self.use_remote_debugger
    }
}

/// A capability to install during bootstrap.
#[derive(Clone)]
pub struct CapabilitySpec {
    /// Name the runtime resolves the capability by.
    pub name: String,
    /// The provider implementation.
    pub provider: Arc<dyn CapabilityProvider>,
    /// Whether the provider only supports asynchronous invocation.
    pub async_only: bool,
}

impl CapabilitySpec {
    /// Creates a capability spec.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn CapabilityProvider>,
        async_only: bool,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            async_only,
        }
    }
}

impl std::fmt::Debug for CapabilitySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySpec")
            .field("name", &self.name)
            .field("async_only", &self.async_only)
            .finish_non_exhaustive()
    }
}

/// External collaborators consumed by one instance.
#[derive(Clone)]
pub struct Collaborators {
    /// Engine construction capability.
    pub holder: Arc<dyn RuntimeHolder>,
    /// Bundle loading capability.
    pub loader: Arc<dyn BundleLoader>,
    /// Capabilities to register during bootstrap.
    pub capabilities: Vec<CapabilitySpec>,
    /// Optional observability sink for scripting-queue events.
    pub notifications: Option<Arc<dyn NotificationSink>>,
}

impl Collaborators {
    /// Creates a collaborator set with no capabilities and no sink.
    #[must_use]
    pub fn new(holder: Arc<dyn RuntimeHolder>, loader: Arc<dyn BundleLoader>) -> Self {
        Self {
            holder,
            loader,
            capabilities: Vec::new(),
            notifications: None,
        }
    }

    /// Adds a capability to install during bootstrap.
    #[must_use]
    pub fn with_capability(mut self, spec: CapabilitySpec) -> Self {
        self.capabilities.push(spec);
        self
    }

    /// Sets the notification sink.
    #[must_use]
    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }
}
