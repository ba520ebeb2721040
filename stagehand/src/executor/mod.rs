//! Executors a job can be enqueued on, and the machinery tracking which one
//! the current thread acts as.
//!
//! A [`SerialExecutorRef`] names a serial execution context: the generic
//! pool, a default actor, or a user supplied [`SerialExecutor`]. A
//! [`TaskExecutorRef`] optionally names where a task prefers to run when its
//! serial executor does not care.
use crate::actor::ActorRef;
use crate::job::{Job, JobPriority};
use crate::runtime::{Schedule, Scheduler};
use crate::task::Task;
use std::fmt;
use std::sync::Arc;

// Public API
mod check;
pub use check::{is_current_executor, report_unexpected_executor};

mod run;
pub use run::{run_job, run_job_on_task_executor};

// Exports
pub(crate) mod switch;

pub(crate) mod tracking;

/// A user supplied serial executor.
///
/// Jobs handed to [`enqueue`](Self::enqueue) must eventually be run, one at a
/// time, through [`run_job`] with a [`SerialExecutorRef::Custom`] naming this
/// executor.
pub trait SerialExecutor: Send + Sync + 'static {
    fn enqueue(&self, job: Job);

    /// Whether `other` shares this executor's exclusive execution context,
    /// even though it is a different executor.
    fn is_same_exclusive_execution_context(&self, _other: &SerialExecutorRef) -> bool {
        false
    }

    /// Called when the current thread is not known to run on this executor.
    /// Must panic unless the executor can prove, by its own means, that the
    /// calling code is isolated to it.
    #[track_caller]
    fn check_isolated(&self) {
        panic!("incorrect actor executor assumption: custom executor cannot prove isolation")
    }
}

/// Preferred executor for tasks whose serial executor does not pin them to a
/// thread.
///
/// Jobs handed to [`enqueue`](Self::enqueue) are run through
/// [`run_job_on_task_executor`].
pub trait TaskExecutor: Send + Sync + 'static {
    fn enqueue(&self, job: Job);
}

/// Identity of a serial executor.
///
/// Equality is identity: two references are equal when they name the same
/// actor or the same custom executor instance.
#[derive(Clone, Default)]
pub enum SerialExecutorRef {
    /// The global concurrent pool. Runs anything, anywhere.
    #[default]
    Generic,

    DefaultActor(ActorRef),

    Custom(Arc<dyn SerialExecutor>),
}

impl SerialExecutorRef {
    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Generic)
    }

    pub fn is_default_actor(&self) -> bool {
        matches!(self, Self::DefaultActor(_))
    }

    /// Whether two distinct executors run in the same exclusive context, as
    /// reported by a custom executor.
    pub(crate) fn is_complex_equal(&self, other: &SerialExecutorRef) -> bool {
        match (self, other) {
            (Self::Custom(this), Self::Custom(_)) => this.is_same_exclusive_execution_context(other),
            _ => false,
        }
    }
}

impl PartialEq for SerialExecutorRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Generic, Self::Generic) => true,
            (Self::DefaultActor(a), Self::DefaultActor(b)) => a.ptr_eq(b),
            (Self::Custom(a), Self::Custom(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl Eq for SerialExecutorRef {}

impl fmt::Debug for SerialExecutorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => f.write_str("Generic"),
            Self::DefaultActor(actor) => f.debug_tuple("DefaultActor").field(&actor.id()).finish(),
            Self::Custom(executor) => f
                .debug_tuple("Custom")
                .field(&Arc::as_ptr(executor).cast::<()>())
                .finish(),
        }
    }
}

/// Optional reference to a [`TaskExecutor`]. Undefined by default.
#[derive(Clone, Default)]
pub struct TaskExecutorRef(Option<Arc<dyn TaskExecutor>>);

impl TaskExecutorRef {
    pub fn undefined() -> Self {
        Self(None)
    }

    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self(Some(executor))
    }

    pub fn is_defined(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_undefined(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn get(&self) -> Option<&Arc<dyn TaskExecutor>> {
        self.0.as_ref()
    }
}

impl PartialEq for TaskExecutorRef {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl Eq for TaskExecutorRef {}

impl fmt::Debug for TaskExecutorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("TaskExecutorRef(undefined)"),
            Some(executor) => f
                .debug_tuple("TaskExecutorRef")
                .field(&Arc::as_ptr(executor).cast::<()>())
                .finish(),
        }
    }
}

/// Routes `job` to `executor`.
///
/// A task with a preferred task executor goes there instead of the generic
/// pool or the actor queue. The task executor is then responsible for
/// running it with the right serial executor.
pub(crate) fn enqueue_on(scheduler: &Scheduler, executor: &SerialExecutorRef, job: Job) {
    let task_executor = job
        .as_task()
        .map(Task::task_executor)
        .unwrap_or_default();

    match executor {
        SerialExecutorRef::Generic => match task_executor.get() {
            Some(task_executor) => task_executor.enqueue(job),
            None => scheduler.schedule(job),
        },
        SerialExecutorRef::DefaultActor(actor) => match task_executor.get() {
            Some(task_executor) => task_executor.enqueue(job),
            None => actor.enqueue(job),
        },
        SerialExecutorRef::Custom(custom) => custom.enqueue(job),
    }
}

/// Represents `priority` on `executor`, which a job was already enqueued on.
pub(crate) fn escalate(executor: &SerialExecutorRef, priority: JobPriority) {
    if let SerialExecutorRef::DefaultActor(actor) = executor {
        actor.enqueue_stealer(priority);
    }
}
