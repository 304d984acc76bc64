//! Host layer errors.
//!
//! Every failure in the lifecycle core is one of these kinds, and every
//! failure flows through the single `on_error` path so diagnostics, UI
//! refresh, and host callbacks stay consistent.
//!
//! # Error Code Convention
//!
//! All host errors use the `HOST_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`Configuration`](HostError::Configuration) | `HOST_CONFIGURATION` | No |
//! | [`EngineConstruction`](HostError::EngineConstruction) | `HOST_ENGINE_CONSTRUCTION` | No |
//! | [`BundleLoad`](HostError::BundleLoad) | `HOST_BUNDLE_LOAD` | Yes |
//! | [`RuntimeCall`](HostError::RuntimeCall) | `HOST_RUNTIME_CALL` | depends on `fatal` |
//! | [`Cancelled`](HostError::Cancelled) | `HOST_CANCELLED` | No |
//! | [`TaskPanicked`](HostError::TaskPanicked) | `HOST_TASK_PANICKED` | No |
//!
//! "Recoverable" means a *fresh* `initialize()`d instance may succeed;
//! there is no internal retry loop. The only local recovery in the
//! state machine is the `WaitingForDebugger ⇄ Loading` cycle, which is
//! not an error at all.

use hearth_engine::EngineError;
use hearth_types::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host lifecycle error.
///
/// # Example
///
/// ```
/// use hearth_host::HostError;
/// use hearth_types::ErrorCode;
///
/// let err = HostError::Cancelled;
/// assert_eq!(err.code(), "HOST_CANCELLED");
/// assert!(!err.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum HostError {
    /// Configuration or presentation-resource acquisition failed before
    /// the engine existed. Fatal, no retry.
    #[error("configuration failed: {0}")]
    Configuration(String),

    /// Engine construction failed on the Scripting context. Fatal.
    #[error("engine construction failed: {0}")]
    EngineConstruction(String),

    /// The script bundle failed to load or evaluate. Fatal for this
    /// attempt; a fresh instance is required to retry.
    #[error("bundle load failed: {0}")]
    BundleLoad(String),

    /// A call into the running scripting runtime failed.
    ///
    /// Surfaced through `on_error`; changes instance state only when
    /// the engine flagged it fatal.
    #[error("runtime call {module}.{method} failed: {message}")]
    RuntimeCall {
        /// Target module of the failed call.
        module: String,
        /// Target method of the failed call.
        method: String,
        /// Engine-provided failure description.
        message: String,
        /// Whether the engine considers the runtime unusable afterwards.
        fatal: bool,
    },

    /// Synthetic error used to force-settle abandoned promises.
    #[error("operation cancelled")]
    Cancelled,

    /// A context task panicked and was contained at the queue boundary.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl ErrorCode for HostError {
    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "HOST_CONFIGURATION",
            Self::EngineConstruction(_) => "HOST_ENGINE_CONSTRUCTION",
            Self::BundleLoad(_) => "HOST_BUNDLE_LOAD",
            Self::RuntimeCall { .. } => "HOST_RUNTIME_CALL",
            Self::Cancelled => "HOST_CANCELLED",
            Self::TaskPanicked(_) => "HOST_TASK_PANICKED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::BundleLoad(_) => true,
            Self::RuntimeCall { fatal, .. } => !fatal,
            Self::Configuration(_)
            | Self::EngineConstruction(_)
            | Self::Cancelled
            | Self::TaskPanicked(_) => false,
        }
    }
}

impl HostError {
    /// Returns `true` if this error terminates the instance.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::RuntimeCall { fatal, .. } => *fatal,
            Self::Configuration(_)
            | Self::EngineConstruction(_)
            | Self::BundleLoad(_)
            | Self::Cancelled
            | Self::TaskPanicked(_) => true,
        }
    }
}

impl From<EngineError> for HostError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ConstructionFailed(msg) => Self::EngineConstruction(msg),
            EngineError::LoadFailed(msg) => Self::BundleLoad(msg),
            EngineError::CallFailed {
                module,
                method,
                message,
                fatal,
            } => Self::RuntimeCall {
                module,
                method,
                message,
                fatal,
            },
            EngineError::CapabilityRejected(msg) => Self::EngineConstruction(msg),
            EngineError::Terminated => Self::Cancelled,
        }
    }
}
