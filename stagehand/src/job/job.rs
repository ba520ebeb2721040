use crate::actor::ProcessingJob;
use crate::job::JobPriority;
use crate::task::Task;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::error;

/// Minimal schedulable unit.
///
/// A job is owned by whoever enqueued it until it starts running. Tasks keep
/// their own storage alive after the job wrapping them has been consumed.
pub struct Job {
    priority: JobPriority,
    kind: JobKind,
}

pub(crate) enum JobKind {
    Simple(Box<dyn FnOnce() + Send + 'static>),
    Task(Task),
    ProcessActor(ProcessingJob),
}

impl Job {
    /// Creates a job running `f` once.
    pub fn new<F>(priority: JobPriority, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            priority,
            kind: JobKind::Simple(Box::new(f)),
        }
    }

    pub(crate) fn from_task(task: Task) -> Self {
        Self {
            priority: task.priority(),
            kind: JobKind::Task(task),
        }
    }

    pub(crate) fn process_actor(job: ProcessingJob) -> Self {
        Self {
            priority: job.priority(),
            kind: JobKind::ProcessActor(job),
        }
    }

    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    pub(crate) fn as_task(&self) -> Option<&Task> {
        match &self.kind {
            JobKind::Task(task) => Some(task),
            _ => None,
        }
    }

    pub(crate) fn is_processing_job(&self) -> bool {
        matches!(self.kind, JobKind::ProcessActor(_))
    }

    /// Runs the job on the current thread. The caller has already pushed the
    /// tracking frame describing the executor this job runs on.
    pub(crate) fn run_in_established_context(self) {
        match self.kind {
            JobKind::Simple(f) => {
                // A panicking job must not take the drainer down with it while
                // it holds an actor lock.
                if catch_unwind(AssertUnwindSafe(f)).is_err() {
                    error!(priority = ?self.priority, "job panicked");
                }
            }
            JobKind::Task(task) => task.run(),
            JobKind::ProcessActor(job) => job.process(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Job");
        dbg.field("priority", &self.priority);

        match &self.kind {
            JobKind::Simple(_) => dbg.field("kind", &"simple"),
            JobKind::Task(task) => dbg.field("task", &task.id()),
            JobKind::ProcessActor(job) => dbg.field("process_actor", job),
        };

        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    assert_impl_all!(Job: Send);

    #[test]
    fn test_simple_job_runs_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let job = {
            let ran = Arc::clone(&ran);
            Job::new(JobPriority::Utility, move || {
                assert!(!ran.swap(true, Ordering::Relaxed));
            })
        };

        assert_eq!(job.priority(), JobPriority::Utility);
        assert!(job.as_task().is_none());

        job.run_in_established_context();
        assert!(ran.load(Ordering::Relaxed));
    }

    #[test]
    fn test_panicking_job_is_contained() {
        let job = Job::new(JobPriority::Default, || panic!("boom"));
        job.run_in_established_context();
    }
}
