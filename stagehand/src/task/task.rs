use crate::executor::tracking;
use crate::executor::{self, SerialExecutorRef, TaskExecutorRef};
use crate::job::{Job, JobPriority};
use crate::runtime::Scheduler;
use crate::task::join::{Completion, JoinError, JoinHandle, JoinState};
use crate::task::state::{State, TransitionToIdle, TransitionToRunning};
use crate::task::Id;
use crate::utils::ScopeGuard;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use tracing::{debug, trace};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A future scheduled as jobs on serial executors.
///
/// Every time the task is woken it is enqueued, as a job, on the executor it
/// asked to resume on. Running that job polls the future once.
#[derive(Clone)]
pub(crate) struct Task(Arc<TaskCell>);

pub(crate) struct TaskCell {
    id: Id,

    state: State,

    /// Raised by escalation, never lowered.
    priority: AtomicU8,

    scheduler: Scheduler,

    task_executor: TaskExecutorRef,

    /// Executor the next job for this task is enqueued on.
    resume_on: Mutex<SerialExecutorRef>,

    /// `None` once the task completed.
    future: Mutex<Option<BoxFuture>>,

    completion: Arc<dyn Completion>,
}

impl Task {
    pub(crate) fn new<F>(
        future: F,
        priority: JobPriority,
        task_executor: TaskExecutorRef,
        scheduler: Scheduler,
        executor: SerialExecutorRef,
    ) -> (Task, JoinHandle<F::Output>)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = Id::next();
        let state = Arc::new(JoinState::new());

        let future: BoxFuture = {
            let state = Arc::clone(&state);
            Box::pin(async move {
                let output = future.await;
                state.finish(Ok(output));
            })
        };

        let cell = Arc::new(TaskCell {
            id,
            state: State::new(),
            priority: AtomicU8::new(priority.as_u8()),
            scheduler,
            task_executor,
            resume_on: Mutex::new(executor),
            future: Mutex::new(Some(future)),
            completion: state.clone(),
        });

        let handle = JoinHandle::new(id, Arc::downgrade(&cell), state);
        (Task(cell), handle)
    }

    pub(crate) fn from_cell(cell: Arc<TaskCell>) -> Self {
        Task(cell)
    }

    pub(crate) fn id(&self) -> Id {
        self.0.id
    }

    pub(crate) fn priority(&self) -> JobPriority {
        JobPriority::from_raw(self.0.priority.load(Ordering::Acquire))
    }

    pub(crate) fn task_executor(&self) -> TaskExecutorRef {
        self.0.task_executor.clone()
    }

    pub(crate) fn resume_on(&self) -> SerialExecutorRef {
        self.0.resume_on.lock().clone()
    }

    pub(crate) fn set_resume_on(&self, executor: SerialExecutorRef) {
        *self.0.resume_on.lock() = executor;
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.0.state.is_complete()
    }

    /// Enqueues the task on the executor it resumes on.
    pub(crate) fn schedule(&self) {
        let executor = self.resume_on();
        trace!(task = %self.id(), ?executor, "scheduling task");
        executor::enqueue_on(&self.0.scheduler, &executor, Job::from_task(self.clone()));
    }

    /// Raises the task's priority and makes the executor it is enqueued on
    /// represent it.
    pub(crate) fn escalate(&self, priority: JobPriority) {
        let prev = self.0.priority.fetch_max(priority.as_u8(), Ordering::AcqRel);
        if prev >= priority.as_u8() || self.is_complete() {
            return;
        }

        debug!(task = %self.id(), ?priority, "escalating task");
        executor::escalate(&self.resume_on(), priority);
    }

    /// Polls the future once on the current thread, in the tracking frame the
    /// caller established.
    pub(crate) fn run(self) {
        if self.0.state.transition_to_running() == TransitionToRunning::Failed {
            return;
        }

        let waker = Waker::from(Arc::clone(&self.0));
        let mut cx = Context::from_waker(&waker);

        let prev = tracking::replace_current_task(Some(self.clone()));
        let _restore = ScopeGuard::new(move || {
            tracking::replace_current_task(prev);
        });

        let mut future = self.0.future.lock();
        let Some(fut) = future.as_mut() else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx))) {
            Ok(Poll::Ready(())) => {
                *future = None;
                self.0.state.transition_to_complete();
                trace!(task = %self.id(), "task completed");
            }
            Ok(Poll::Pending) => {
                drop(future);
                if self.0.state.transition_to_idle() == TransitionToIdle::OkNotified {
                    self.schedule();
                }
            }
            Err(payload) => {
                *future = None;
                self.0.state.transition_to_complete();

                let message = panic_message(payload.as_ref());
                debug!(task = %self.id(), %message, "task panicked");
                self.0.completion.fail(JoinError::Panic {
                    id: self.id(),
                    message,
                });
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Wake for TaskCell {
    fn wake(self: Arc<Self>) {
        if self.state.transition_to_notified() {
            Task(self).schedule();
        }
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if self.state.transition_to_notified() {
            Task(Arc::clone(self)).schedule();
        }
    }
}

impl Drop for TaskCell {
    fn drop(&mut self) {
        if !self.state.is_complete() {
            self.completion.fail(JoinError::Cancelled { id: self.id });
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("state", &self.0.state)
            .finish()
    }
}
