use crate::job::JobPriority;
use crate::task::{Id, Task, TaskCell};
use futures::task::AtomicWaker;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

/// Task failed to produce its output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("task {id} panicked: {message}")]
    Panic { id: Id, message: String },

    #[error("task {id} was dropped before completing")]
    Cancelled { id: Id },
}

impl JoinError {
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn id(&self) -> Id {
        match self {
            Self::Panic { id, .. } | Self::Cancelled { id } => *id,
        }
    }
}

/// Type-erased side of the join state, seen by the task.
pub(crate) trait Completion: Send + Sync + 'static {
    fn fail(&self, err: JoinError);
}

/// Output slot shared by a task and its [`JoinHandle`].
pub(crate) struct JoinState<T> {
    output: Mutex<Option<Result<T, JoinError>>>,
    cond: Condvar,
    finished: AtomicBool,
    waker: AtomicWaker,
}

impl<T> JoinState<T> {
    pub(crate) fn new() -> Self {
        Self {
            output: Mutex::new(None),
            cond: Condvar::new(),
            finished: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    /// Stores the outcome of the task. Only the first outcome is kept.
    pub(crate) fn finish(&self, res: Result<T, JoinError>) {
        {
            let mut output = self.output.lock();
            if self.finished.load(Ordering::Acquire) {
                return;
            }

            *output = Some(res);
            self.finished.store(true, Ordering::Release);
        }

        self.cond.notify_all();
        self.waker.wake();
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    #[track_caller]
    fn try_take(&self) -> Option<Result<T, JoinError>> {
        if !self.is_finished() {
            return None;
        }

        match self.output.lock().take() {
            Some(res) => Some(res),
            None => panic!("`JoinHandle` polled after completion"),
        }
    }
}

impl<T: Send + 'static> Completion for JoinState<T> {
    fn fail(&self, err: JoinError) {
        self.finish(Err(err));
    }
}

/// Owned permission to wait for a task's output.
///
/// Dropping the handle detaches the task: it keeps running and its output is
/// discarded.
pub struct JoinHandle<T> {
    id: Id,
    task: Weak<TaskCell>,
    state: Arc<JoinState<T>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(id: Id, task: Weak<TaskCell>, state: Arc<JoinState<T>>) -> Self {
        Self { id, task, state }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Blocks the current thread until the task finishes.
    ///
    /// Never call this from a thread the task needs in order to make
    /// progress.
    pub fn join(self) -> Result<T, JoinError> {
        let mut output = self.state.output.lock();
        while !self.state.is_finished() {
            self.state.cond.wait(&mut output);
        }

        match output.take() {
            Some(res) => res,
            None => panic!("`JoinHandle` joined after completion"),
        }
    }

    /// Raises the priority of the task to `priority`. Does nothing if the
    /// task already completed.
    pub fn escalate(&self, priority: JobPriority) {
        if let Some(cell) = self.task.upgrade() {
            Task::from_cell(cell).escalate(priority);
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(res) = self.state.try_take() {
            return Poll::Ready(res);
        }

        self.state.waker.register(cx.waker());

        match self.state.try_take() {
            Some(res) => Poll::Ready(res),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use static_assertions::assert_impl_all;
    use std::thread;

    assert_impl_all!(JoinHandle<u32>: Send, Sync, Unpin);
    assert_impl_all!(JoinError: Send, Sync, std::error::Error);

    fn handle<T>() -> (JoinHandle<T>, Arc<JoinState<T>>) {
        let state = Arc::new(JoinState::new());
        let handle = JoinHandle::new(Id::next(), Weak::new(), Arc::clone(&state));
        (handle, state)
    }

    #[test]
    fn test_join_blocks_until_finished() -> Result<()> {
        let (handle, state) = handle::<&str>();
        assert!(!handle.is_finished());

        let finisher = thread::spawn(move || state.finish(Ok("done")));

        assert_eq!(handle.join()?, "done");
        finisher
            .join()
            .map_err(|_| anyhow::anyhow!("finisher panicked"))?;
        Ok(())
    }

    #[test]
    fn test_first_outcome_wins() {
        let (handle, state) = handle::<u8>();
        let id = handle.id();

        state.finish(Ok(1));
        state.fail(JoinError::Cancelled { id });

        assert!(handle.is_finished());
        assert_eq!(handle.join(), Ok(1));
    }

    #[test]
    fn test_error_display() {
        let id = Id::next();
        let err = JoinError::Panic {
            id,
            message: "boom".to_string(),
        };

        assert!(err.is_panic());
        assert_eq!(err.id(), id);
        assert_eq!(err.to_string(), format!("task {id} panicked: boom"));
    }

    #[test]
    fn test_escalate_detached_task_is_noop() {
        let (handle, _state) = handle::<()>();
        handle.escalate(JobPriority::UserInteractive);
    }
}
