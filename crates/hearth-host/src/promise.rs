//! Settle-once lifecycle promises.
//!
//! A [`OncePromise`] settles exactly once: the first caller's value (or
//! error) wins and every later attempt is a silent no-op. Continuations
//! registered before settlement run at settle time; continuations
//! registered after run immediately, so there is no missed-notification
//! window.
//!
//! The instance uses three of these - "created", "loaded", "destroyed" -
//! and chains them so the externally observed "loaded" callback always
//! fires (successfully or cancellation-tagged) before "destroyed" can
//! settle: the destroyed path's first action is a
//! [`try_cancel`](OncePromise::try_cancel) on the loaded promise.

use crate::context::ContextQueue;
use crate::error::HostError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// The settled outcome of a promise.
pub type Settled<T> = Result<T, HostError>;

type Continuation<T> = Box<dyn FnOnce(Settled<T>) + Send + 'static>;

enum Slot<T> {
    Pending(Vec<(Option<ContextQueue>, Continuation<T>)>),
    Settled(Settled<T>),
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

/// A single-assignment future for lifecycle signals.
///
/// Clones share the same settlement; the type is cheap to clone and
/// hand to waiters on any thread.
///
/// # Example
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use hearth_host::OncePromise;
///
/// let promise: OncePromise<u32> = OncePromise::new();
/// assert!(promise.settle(Ok(7)));
/// assert!(!promise.settle(Ok(8))); // second settle is a no-op
/// assert_eq!(promise.wait().await, Ok(7));
/// # });
/// ```
pub struct OncePromise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OncePromise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for OncePromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> OncePromise<T> {
    /// Creates a pending promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Pending(Vec::new())),
                notify: Notify::new(),
            }),
        }
    }

    /// Settles the promise.
    ///
    /// Returns `true` if this call won the settlement; `false` means the
    /// promise was already settled and `result` was ignored.
    pub fn settle(&self, result: Settled<T>) -> bool {
        let waiters = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Settled(_) => return false,
                Slot::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *slot = Slot::Settled(result.clone());
                    waiters
                }
            }
        };

        // Continuations first: callbacks chained on this promise are
        // observed before any async waiter wakes up.
        for (target, continuation) in waiters {
            Self::deliver(target, continuation, result.clone());
        }

        self.inner.notify.notify_waiters();
        true
    }

    /// Settles with [`HostError::Cancelled`] if still pending.
    ///
    /// Returns `true` if the cancellation won.
    pub fn try_cancel(&self) -> bool {
        self.settle(Err(HostError::Cancelled))
    }

    /// Returns `true` once the promise settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.slot.lock(), Slot::Settled(_))
    }

    /// Returns a copy of the settled value, if any.
    #[must_use]
    pub fn peek(&self) -> Option<Settled<T>> {
        match &*self.inner.slot.lock() {
            Slot::Settled(result) => Some(result.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Runs `f` synchronously at settle time (or immediately if already
    /// settled).
    ///
    /// Inline continuations are for ordering-critical chains; anything
    /// that may take time belongs on a context queue via
    /// [`on_settle_on`](Self::on_settle_on).
    pub fn on_settle_inline<F>(&self, f: F)
    where
        F: FnOnce(Settled<T>) + Send + 'static,
    {
        self.register(None, Box::new(f));
    }

    /// Posts `f` to `queue` at settle time (or immediately if already
    /// settled).
    ///
    /// If the queue has closed by then the continuation is dropped, like
    /// any other post to a closed queue.
    pub fn on_settle_on<F>(&self, queue: &ContextQueue, f: F)
    where
        F: FnOnce(Settled<T>) + Send + 'static,
    {
        self.register(Some(queue.clone()), Box::new(f));
    }

    fn register(&self, target: Option<ContextQueue>, continuation: Continuation<T>) {
        let settled = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Pending(waiters) => {
                    waiters.push((target, continuation));
                    return;
                }
                Slot::Settled(result) => result.clone(),
            }
        };
        // Already settled: deliver outside the lock.
        Self::deliver(target, continuation, settled);
    }

    fn deliver(target: Option<ContextQueue>, continuation: Continuation<T>, result: Settled<T>) {
        match target {
            Some(queue) => {
                queue.post(move || {
                    continuation(result);
                    Ok(())
                });
            }
            None => continuation(result),
        }
    }

    /// Waits for settlement.
    pub async fn wait(&self) -> Settled<T> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(result) = self.peek() {
                return result;
            }
            notified.await;
        }
    }
}

impl<T> std::fmt::Debug for OncePromise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.inner.slot.lock() {
            Slot::Pending(waiters) => format!("pending({} waiters)", waiters.len()),
            Slot::Settled(Ok(_)) => "settled(ok)".to_string(),
            Slot::Settled(Err(err)) => format!("settled(err: {err})"),
        };
        write!(f, "OncePromise({state})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextRole;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn first_settle_wins() {
        let promise: OncePromise<u32> = OncePromise::new();

        assert!(promise.settle(Ok(1)));
        assert!(!promise.settle(Ok(2)));
        assert!(!promise.settle(Err(HostError::Cancelled)));

        assert_eq!(promise.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn try_cancel_only_wins_while_pending() {
        let promise: OncePromise<()> = OncePromise::new();
        assert!(promise.try_cancel());
        assert_eq!(promise.peek(), Some(Err(HostError::Cancelled)));

        let promise: OncePromise<()> = OncePromise::new();
        promise.settle(Ok(()));
        assert!(!promise.try_cancel());
        assert_eq!(promise.peek(), Some(Ok(())));
    }

    #[tokio::test]
    async fn inline_continuation_runs_once_at_settle() {
        let promise: OncePromise<u32> = OncePromise::new();
        let count = Arc::new(AtomicUsize::new(0));

        promise.on_settle_inline({
            let count = Arc::clone(&count);
            move |result| {
                assert_eq!(result, Ok(5));
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
        promise.settle(Ok(5));
        promise.settle(Ok(6));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_continuation_runs_immediately() {
        let promise: OncePromise<u32> = OncePromise::new();
        promise.settle(Ok(9));

        let count = Arc::new(AtomicUsize::new(0));
        promise.on_settle_inline({
            let count = Arc::clone(&count);
            move |result| {
                assert_eq!(result, Ok(9));
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queued_continuation_runs_on_target_queue() {
        let queue = ContextQueue::spawn(ContextRole::Control);
        let promise: OncePromise<()> = OncePromise::new();
        let count = Arc::new(AtomicUsize::new(0));

        promise.on_settle_on(&queue, {
            let count = Arc::clone(&count);
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        promise.settle(Ok(()));
        queue.run_and_wait(|| Ok(())).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multiple_waiters_all_observe() {
        let promise: OncePromise<u32> = OncePromise::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let promise = promise.clone();
                tokio::spawn(async move { promise.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        promise.settle(Ok(3));

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(3));
        }
    }

    #[tokio::test]
    async fn wait_after_settle_returns_immediately() {
        let promise: OncePromise<u32> = OncePromise::new();
        promise.settle(Err(HostError::Cancelled));
        assert_eq!(promise.wait().await, Err(HostError::Cancelled));
    }
}
