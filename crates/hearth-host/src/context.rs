//! Serialized execution contexts.
//!
//! The host coordinates three logical contexts, each a serialized FIFO
//! task queue running as its own tokio task:
//!
//! ```text
//!  Control ──────► host orchestration, error callbacks
//!  Scripting ────► engine construction, calls, teardown
//!  Presentation ─► UI-affine resource setup, refresh hooks
//! ```
//!
//! Posting to a context is fire-and-forget. [`ContextQueue::run_and_wait`]
//! is the one synchronous boundary: the caller suspends until the posted
//! task completed on the target context. Jobs themselves are plain
//! synchronous closures and never wait on another context - only
//! orchestrating tasks do - which rules out the two-contexts-waiting-on-
//! each-other deadlock by construction.
//!
//! Every job runs inside a containment boundary: a returned error or a
//! caught panic is converted to a [`HostError`] and routed to the
//! queue's error hook instead of escaping the worker.

use crate::error::HostError;
use hearth_engine::{events, NotificationSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A fallible unit of work posted to a context.
type Job = Box<dyn FnOnce() -> Result<(), HostError> + Send + 'static>;

enum Work {
    Task(Job),
    Quit,
}

/// Hook receiving errors contained at the job boundary.
pub type ErrorHook = Arc<dyn Fn(HostError) + Send + Sync>;

/// The execution affinity a [`ContextQueue`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextRole {
    /// Host-control context: orchestration and host callbacks.
    Control,
    /// Scripting-engine context: all engine interaction.
    Scripting,
    /// UI-affine context: presentation resources and refresh.
    Presentation,
}

impl std::fmt::Display for ContextRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Scripting => write!(f, "scripting"),
            Self::Presentation => write!(f, "presentation"),
        }
    }
}

/// Builder for a [`ContextQueue`].
pub struct ContextQueueBuilder {
    role: ContextRole,
    error_hook: Option<ErrorHook>,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl ContextQueueBuilder {
    /// Starts a builder for a queue with the given role.
    #[must_use]
    pub fn new(role: ContextRole) -> Self {
        Self {
            role,
            error_hook: None,
            sink: None,
        }
    }

    /// Routes contained job errors to `hook`.
    #[must_use]
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    /// Emits task-starting/idle-wait notifications to `sink`.
    #[must_use]
    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Spawns the worker task and returns the queue handle.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ContextQueue {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(worker_loop(self.role, rx, self.error_hook, self.sink));

        ContextQueue {
            role: self.role,
            tx,
            closed,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }
}

async fn worker_loop(
    role: ContextRole,
    mut rx: mpsc::UnboundedReceiver<Work>,
    error_hook: Option<ErrorHook>,
    sink: Option<Arc<dyn NotificationSink>>,
) {
    info!("context queue {} started", role);

    loop {
        // Distinguish ready work from an idle wait so the sink can see
        // the queue going quiet.
        let work = match rx.try_recv() {
            Ok(work) => work,
            Err(mpsc::error::TryRecvError::Empty) => {
                if let Some(sink) = &sink {
                    sink.notify(events::SCRIPT_IDLE_WAIT_STARTING);
                }
                let received = rx.recv().await;
                if let Some(sink) = &sink {
                    sink.notify(events::SCRIPT_IDLE_WAIT_COMPLETED);
                }
                match received {
                    Some(work) => work,
                    None => break,
                }
            }
            Err(mpsc::error::TryRecvError::Disconnected) => break,
        };

        match work {
            Work::Task(job) => {
                if let Some(sink) = &sink {
                    sink.notify(events::SCRIPT_TASK_STARTING);
                }

                let outcome =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!("context queue {}: task failed: {}", role, err);
                        if let Some(hook) = &error_hook {
                            hook(err);
                        }
                    }
                    Err(panic) => {
                        let err = HostError::TaskPanicked(panic_message(&panic));
                        warn!("context queue {}: task panicked: {}", role, err);
                        if let Some(hook) = &error_hook {
                            hook(err);
                        }
                    }
                }
            }
            Work::Quit => break,
        }
    }

    info!("context queue {} stopped", role);
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a serialized context queue.
///
/// Cheap to clone; all clones feed the same worker. Closing the queue
/// makes every subsequent [`post`](Self::post) drop its job (running the
/// job's destructors, which is what lets an RAII guard observe an
/// abandoned task).
#[derive(Clone)]
pub struct ContextQueue {
    role: ContextRole,
    tx: mpsc::UnboundedSender<Work>,
    closed: Arc<AtomicBool>,
    worker: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl ContextQueue {
    /// Spawns a queue with no hooks attached.
    #[must_use]
    pub fn spawn(role: ContextRole) -> Self {
        ContextQueueBuilder::new(role).spawn()
    }

    /// Returns this queue's role.
    #[must_use]
    pub fn role(&self) -> ContextRole {
        self.role
    }

    /// Posts a fallible job, fire-and-forget.
    ///
    /// Returns `false` (dropping `job`) if the queue is closed.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() -> Result<(), HostError> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            debug!("context queue {}: dropping post after close", self.role);
            return false;
        }
        self.tx.send(Work::Task(Box::new(job))).is_ok()
    }

    /// Posts `f` and suspends the caller until it completed on this
    /// context, returning its result.
    ///
    /// This is the synchronous boundary of §concurrency: use it only
    /// from orchestrating tasks, never from inside another context's
    /// job. Returns [`HostError::Cancelled`] if the queue was closed
    /// before the job could run.
    pub async fn run_and_wait<T, F>(&self, f: F) -> Result<T, HostError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, HostError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let posted = self.post(move || {
            // Result travels to the waiter, not to the queue hook.
            let _ = tx.send(f());
            Ok(())
        });
        if !posted {
            return Err(HostError::Cancelled);
        }
        rx.await.unwrap_or(Err(HostError::Cancelled))
    }

    /// Stops accepting new work and lets the backlog drain.
    ///
    /// Jobs posted before `close` still run; the worker exits after
    /// them. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Work::Quit);
    }

    /// Returns `true` once the queue no longer accepts work.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits for the worker to finish its backlog and exit.
    ///
    /// Call [`close`](Self::close) first or this waits indefinitely.
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for ContextQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextQueue")
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The three context queues owned by one instance.
#[derive(Clone, Debug)]
pub struct ContextSet {
    control: ContextQueue,
    scripting: ContextQueue,
    presentation: ContextQueue,
}

impl ContextSet {
    /// Spawns all three queues.
    ///
    /// `error_hook` receives job-boundary failures from every queue;
    /// `sink` (if any) observes the Scripting queue only.
    #[must_use]
    pub fn spawn(error_hook: ErrorHook, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        let mut scripting = ContextQueueBuilder::new(ContextRole::Scripting)
            .with_error_hook(Arc::clone(&error_hook));
        if let Some(sink) = sink {
            scripting = scripting.with_notifications(sink);
        }

        Self {
            control: ContextQueueBuilder::new(ContextRole::Control)
                .with_error_hook(Arc::clone(&error_hook))
                .spawn(),
            scripting: scripting.spawn(),
            presentation: ContextQueueBuilder::new(ContextRole::Presentation)
                .with_error_hook(error_hook)
                .spawn(),
        }
    }

    /// The host-control queue.
    #[must_use]
    pub fn control(&self) -> &ContextQueue {
        &self.control
    }

    /// The scripting-engine queue.
    #[must_use]
    pub fn scripting(&self) -> &ContextQueue {
        &self.scripting
    }

    /// The presentation queue.
    #[must_use]
    pub fn presentation(&self) -> &ContextQueue {
        &self.presentation
    }

    /// Closes all three queues.
    pub fn close_all(&self) {
        self.control.close();
        self.scripting.close();
        self.presentation.close();
    }
}
