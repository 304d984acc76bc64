//! Instance lifecycle and cross-context call dispatch.
//!
//! `hearth-host` owns the state machine that creates, loads, and tears
//! down a managed scripting runtime instance coordinated across three
//! serialized execution contexts (Control, Scripting, Presentation).
//! It guarantees that:
//!
//! - lifecycle callbacks fire exactly once, in order ("loaded" always
//!   before "destroyed", even when bootstrap is abandoned mid-flight)
//! - calls into the runtime are never issued while the runtime is not
//!   in a safe state: they dispatch, buffer FIFO, or drop depending on
//!   the lifecycle state
//! - teardown is cancellation-safe and idempotent
//!
//! # Architecture
//!
//! ```text
//!             ┌──────────────────────────────────────────┐
//!             │              ScriptInstance              │
//!             │                                          │
//! initialize ─► BootstrapSequencer ──┐                   │
//! callFunction► StateRegister ───────┼──► ContextQueue   │
//! destroy ────► TeardownSequencer ───┘    (Scripting)    │
//!             │        │                      │          │
//!             │   OncePromise ×3          ScriptEngine   │
//!             └──────────────────────────────────────────┘
//! ```
//!
//! The engine, bundle loader, and capability modules are external
//! collaborators consumed through the traits in [`hearth_engine`].

mod bootstrap;
mod context;
mod error;
mod instance;
mod options;
mod promise;
mod registry;
mod state;
mod teardown;

pub use context::{ContextQueue, ContextQueueBuilder, ContextRole, ContextSet, ErrorHook};
pub use error::HostError;
pub use instance::ScriptInstance;
pub use options::{
    CapabilitySpec, Collaborators, EngineMode, ErrorCallback, HostCallbacks, InstanceCallback,
    InstanceOptions, LoadedCallback, UiRefreshHook,
};
pub use promise::{OncePromise, Settled};
pub use registry::dispatch_fault;
pub use state::{BufferedCall, Decision, LifecycleState, StateRegister};
pub use teardown::DestroyedHandle;
