//! Lifecycle state register and buffered call queue.
//!
//! # State Machine
//!
//! ```text
//! Loading ⇄ WaitingForDebugger
//!    │
//!    ├──────► Loaded ──────► Unloaded
//!    │           │
//!    └───────────┴─────────► HasError
//! ```
//!
//! `HasError` and `Unloaded` are terminal. Transitions are linearized
//! by compare-and-swap against the legal-edge table; a terminal state is
//! entered at most once no matter how many paths race toward it.
//!
//! The buffered call queue is mutated only inside the same critical
//! section that reads the state, so a caller can never observe a state
//! and act on a queue that belongs to a different state. The returned
//! [`Decision`] is executed by the caller *outside* the lock - the lock
//! is held only for O(1) operations, never across an engine call.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::debug;

/// Lifecycle state of a hosted instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Bootstrap in progress; calls are buffered.
    #[default]
    Loading,

    /// Bootstrap paused waiting for a debugger to attach.
    ///
    /// Re-enters `Loading` once attached or timed out. Calls keep
    /// buffering.
    WaitingForDebugger,

    /// The runtime is live; calls dispatch (in buffered order).
    Loaded,

    /// A fatal error terminated the instance.
    ///
    /// Terminal - calls are dropped silently.
    HasError,

    /// The instance was torn down.
    ///
    /// Terminal - calls are dropped silently.
    Unloaded,
}

impl LifecycleState {
    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::HasError | Self::Unloaded)
    }

    /// Returns `true` while bootstrap has not finished.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading | Self::WaitingForDebugger)
    }

    /// Returns `true` if `next` is a legal direct transition.
    #[must_use]
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Loading, WaitingForDebugger)
                | (Loading, Loaded)
                | (Loading, HasError)
                | (Loading, Unloaded)
                | (WaitingForDebugger, Loading)
                | (WaitingForDebugger, Loaded)
                | (WaitingForDebugger, HasError)
                | (WaitingForDebugger, Unloaded)
                | (Loaded, HasError)
                | (Loaded, Unloaded)
        )
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Loading => 0,
            Self::WaitingForDebugger => 1,
            Self::Loaded => 2,
            Self::HasError => 3,
            Self::Unloaded => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Loading,
            1 => Self::WaitingForDebugger,
            2 => Self::Loaded,
            3 => Self::HasError,
            _ => Self::Unloaded,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::WaitingForDebugger => write!(f, "waiting_for_debugger"),
            Self::Loaded => write!(f, "loaded"),
            Self::HasError => write!(f, "has_error"),
            Self::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// A deferred cross-runtime function invocation.
///
/// Owned exclusively by the [`StateRegister`] from enqueue until
/// dequeue-and-dispatch; queue order is FIFO and observable by the host
/// application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedCall {
    /// Target module name.
    pub module: String,
    /// Target method name.
    pub method: String,
    /// Arguments, in order.
    pub args: Vec<Value>,
}

impl BufferedCall {
    /// Creates a buffered call.
    #[must_use]
    pub fn new(module: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            module: module.into(),
            method: method.into(),
            args,
        }
    }
}

/// Outcome of [`StateRegister::enqueue_or_dispatch`].
///
/// The caller executes the decision outside the register lock.
#[derive(Debug)]
pub enum Decision {
    /// State is `Loaded` with an empty buffer: dispatch now.
    Dispatch(BufferedCall),
    /// Call was appended to the buffer.
    Buffered,
    /// State is terminal: the call was discarded.
    ///
    /// Deliberately lossy - late calls after failure or teardown are
    /// meaningless to a runtime that will never run them.
    Dropped,
}

/// Atomically observed lifecycle state plus the buffered call queue.
pub struct StateRegister {
    state: AtomicU8,
    calls: Mutex<VecDeque<BufferedCall>>,
    draining: AtomicBool,
}

impl Default for StateRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRegister {
    /// Creates a register in `Loading` with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Loading.to_u8()),
            calls: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Non-blocking state read.
    #[must_use]
    pub fn current(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempts the transition to `next`.
    ///
    /// Compare-and-swapped against the legal-edge table; returns `true`
    /// if this call performed the transition. Racing callers toward a
    /// terminal state means exactly one of them wins.
    pub fn transition_to(&self, next: LifecycleState) -> bool {
        let mut current = self.current();
        loop {
            if !current.can_transition_to(next) {
                debug!("state transition {} -> {} rejected", current, next);
                return false;
            }
            match self.state.compare_exchange(
                current.to_u8(),
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!("state transition {} -> {}", current, next);
                    return true;
                }
                Err(observed) => current = LifecycleState::from_u8(observed),
            }
        }
    }

    /// Decides what to do with `call` given the current state.
    ///
    /// The state read and any queue mutation happen in one critical
    /// section. A `Loaded` state with a non-empty buffer still buffers,
    /// preserving strict FIFO order across the load transition.
    pub fn enqueue_or_dispatch(&self, call: BufferedCall) -> Decision {
        let mut calls = self.calls.lock();
        match self.current() {
            LifecycleState::Loaded if calls.is_empty() => Decision::Dispatch(call),
            LifecycleState::Loading | LifecycleState::WaitingForDebugger => {
                calls.push_back(call);
                Decision::Buffered
            }
            LifecycleState::Loaded => {
                calls.push_back(call);
                Decision::Buffered
            }
            LifecycleState::HasError | LifecycleState::Unloaded => Decision::Dropped,
        }
    }

    /// Pops the front call while the state is still `Loaded`.
    ///
    /// The drain loop calls this repeatedly, dispatching each call
    /// outside the lock, so the lock is never held across an engine
    /// call.
    #[must_use]
    pub fn pop_if_loaded(&self) -> Option<BufferedCall> {
        let mut calls = self.calls.lock();
        if self.current() == LifecycleState::Loaded {
            calls.pop_front()
        } else {
            None
        }
    }

    /// Swaps the buffer out for destruction.
    ///
    /// Only yields calls in a terminal state; the returned collection is
    /// destroyed by the caller outside the lock, because call payloads
    /// may carry resources with non-trivial teardown.
    #[must_use]
    pub fn discard(&self) -> VecDeque<BufferedCall> {
        let mut calls = self.calls.lock();
        if self.current().is_terminal() {
            std::mem::take(&mut *calls)
        } else {
            VecDeque::new()
        }
    }

    /// Claims the single drain flight.
    ///
    /// Returns `false` if a drain is already in progress; the register
    /// guarantees at most one drain at a time even across a
    /// `WaitingForDebugger → Loading → Loaded` re-entry.
    pub fn begin_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the drain flight claimed by [`begin_drain`](Self::begin_drain).
    pub fn end_drain(&self) {
        self.draining.store(false, Ordering::Release);
    }

    /// Number of buffered calls.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.calls.lock().len()
    }
}

impl std::fmt::Debug for StateRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegister")
            .field("state", &self.current())
            .field("queued", &self.queued_len())
            .finish()
    }
}
