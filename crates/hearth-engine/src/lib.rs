//! Collaborator contracts for the hearth runtime host.
//!
//! The host core never talks to a concrete scripting engine, bundle
//! loader, or capability module. It consumes them through the narrow
//! traits defined here:
//!
//! - [`RuntimeHolder`] / [`ScriptEngine`] - engine construction and the
//!   call surface, always exercised on the Scripting context
//! - [`BundleLoader`] - sync/async script loading with a completion
//!   notifier
//! - [`CapabilityRegistry`] - named capability providers resolved lazily
//! - [`NotificationSink`] - fire-and-forget observability events
//!
//! The [`testing`] module ships recording/scripted doubles for all of
//! these so host behavior can be tested without a real engine.

mod capability;
mod engine;
mod error;
mod loader;
mod notify;
pub mod testing;

pub use capability::{CapabilityProvider, CapabilityRegistry};
pub use engine::{EngineConfig, RuntimeHolder, ScriptEngine};
pub use error::EngineError;
pub use loader::{BundleLoader, LoadCompletion, Script};
pub use notify::{events, NotificationSink};
