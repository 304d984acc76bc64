//! Identifier types for hearth.
//!
//! Identifiers are UUID-based so they stay unique across processes and
//! are never reused after an instance is gone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a hosted scripting-runtime instance.
///
/// Every instance gets a fresh random id at construction. The id is the
/// only thing cross-context callbacks are allowed to capture as a
/// back-reference: they resolve it through the fault registry instead of
/// holding a pointer to the instance, so a callback that outlives its
/// instance degrades to a no-op rather than a dangling access.
///
/// # Example
///
/// ```
/// use hearth_types::InstanceId;
///
/// let a = InstanceId::new();
/// let b = InstanceId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Creates a new unique [`InstanceId`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short prefix is enough for log correlation.
        write!(f, "inst-{}", &self.0.as_simple().to_string()[..8])
    }
}
