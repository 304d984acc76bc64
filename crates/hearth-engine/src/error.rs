//! Engine layer errors.
//!
//! Failures reported by the engine-side collaborators. All errors
//! implement [`ErrorCode`] for unified handling by the host.
//!
//! # Error Code Convention
//!
//! All engine errors use the `ENGINE_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`ConstructionFailed`](EngineError::ConstructionFailed) | `ENGINE_CONSTRUCTION_FAILED` | No |
//! | [`LoadFailed`](EngineError::LoadFailed) | `ENGINE_LOAD_FAILED` | Yes |
//! | [`CallFailed`](EngineError::CallFailed) | `ENGINE_CALL_FAILED` | depends on `fatal` |
//! | [`CapabilityRejected`](EngineError::CapabilityRejected) | `ENGINE_CAPABILITY_REJECTED` | No |
//! | [`Terminated`](EngineError::Terminated) | `ENGINE_TERMINATED` | No |
//!
//! A recoverable error means a *fresh instance* may succeed; the host
//! never retries inside the same instance.

use hearth_types::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine collaborator error.
///
/// # Example
///
/// ```
/// use hearth_engine::EngineError;
/// use hearth_types::ErrorCode;
///
/// let err = EngineError::LoadFailed("bundle missing".into());
/// assert_eq!(err.code(), "ENGINE_LOAD_FAILED");
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum EngineError {
    /// Engine construction failed.
    ///
    /// The runtime holder could not produce a live engine. The instance
    /// is unusable; the host must build a new one with different options.
    #[error("engine construction failed: {0}")]
    ConstructionFailed(String),

    /// Script bundle failed to load or evaluate.
    ///
    /// Fatal for this attempt. A fresh instance may succeed once the
    /// bundle is fixed or reachable again.
    #[error("bundle load failed: {0}")]
    LoadFailed(String),

    /// A call into the scripting runtime failed.
    ///
    /// Non-fatal call failures are reported to the host and the instance
    /// keeps running; `fatal` failures terminate the instance.
    #[error("call {module}.{method} failed: {message}")]
    CallFailed {
        /// Target module of the failed call.
        module: String,
        /// Target method of the failed call.
        method: String,
        /// Engine-provided failure description.
        message: String,
        /// Whether the engine considers the runtime unusable afterwards.
        fatal: bool,
    },

    /// A capability registration was refused by the engine.
    #[error("capability rejected: {0}")]
    CapabilityRejected(String),

    /// The engine has already been released.
    ///
    /// Raised when a collaborator is exercised after teardown started.
    #[error("engine terminated")]
    Terminated,
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConstructionFailed(_) => "ENGINE_CONSTRUCTION_FAILED",
            Self::LoadFailed(_) => "ENGINE_LOAD_FAILED",
            Self::CallFailed { .. } => "ENGINE_CALL_FAILED",
            Self::CapabilityRejected(_) => "ENGINE_CAPABILITY_REJECTED",
            Self::Terminated => "ENGINE_TERMINATED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::LoadFailed(_) => true,
            Self::CallFailed { fatal, .. } => !fatal,
            Self::ConstructionFailed(_) | Self::CapabilityRejected(_) | Self::Terminated => false,
        }
    }
}

impl EngineError {
    /// Returns `true` if this error terminates the instance.
    ///
    /// Construction, load, and fatal call failures end the instance;
    /// non-fatal call failures are reported and execution continues.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CallFailed { fatal, .. } => *fatal,
            Self::ConstructionFailed(_) | Self::LoadFailed(_) | Self::Terminated => true,
            Self::CapabilityRejected(_) => false,
        }
    }
}
