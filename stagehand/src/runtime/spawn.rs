//! Configuring tasks before they are spawned.
//!
//! [`Runtime::spawn`](crate::Runtime::spawn) spawns with default options.
//! [`SpawnBuilder`] sets the task's priority or its preferred task executor.
use crate::executor::{SerialExecutorRef, TaskExecutorRef};
use crate::job::JobPriority;
use crate::runtime::Scheduler;
use crate::task::{JoinHandle, Task};
use std::fmt;
use std::future::Future;
use tracing::debug;

/// A builder for configuring and spawning a new task.
///
/// Created by calling [`Runtime::spawn_builder`](crate::Runtime::spawn_builder).
pub struct SpawnBuilder<'a> {
    scheduler: &'a Scheduler,

    priority: JobPriority,

    task_executor: TaskExecutorRef,
}

impl<'a> SpawnBuilder<'a> {
    pub(crate) fn new(scheduler: &'a Scheduler) -> Self {
        Self {
            scheduler,
            priority: JobPriority::Default,
            task_executor: TaskExecutorRef::undefined(),
        }
    }

    /// Sets the priority of the jobs running the task. Defaults to
    /// [`JobPriority::Default`].
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the executor the task prefers when its serial executor does not
    /// pin it to a thread.
    pub fn with_task_executor(mut self, task_executor: TaskExecutorRef) -> Self {
        self.task_executor = task_executor;
        self
    }

    /// Spawns the task. Its first job is enqueued on `executor`.
    pub fn spawn<F>(self, executor: SerialExecutorRef, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (task, handle) = Task::new(
            future,
            self.priority,
            self.task_executor,
            self.scheduler.clone(),
            executor,
        );

        debug!(task = %task.id(), priority = ?self.priority, "spawning task");
        task.schedule();

        handle
    }
}

impl fmt::Debug for SpawnBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnBuilder")
            .field("priority", &self.priority)
            .field("task_executor", &self.task_executor)
            .finish()
    }
}
