use crate::executor::{
    SerialExecutor, SerialExecutorRef, TaskExecutor, TaskExecutorRef, run_job,
    run_job_on_task_executor,
};
use crate::job::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serial executor holding jobs until the test runs them.
#[derive(Default)]
pub(crate) struct QueueExecutor {
    jobs: Mutex<VecDeque<Job>>,

    /// When set, `check_isolated` accepts any caller instead of panicking.
    trusts_caller: bool,
}

impl QueueExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn trusting() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::default(),
            trusts_caller: true,
        })
    }

    pub(crate) fn num_queued(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Takes the oldest job out, for tests that run it elsewhere.
    pub(crate) fn pop(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    /// Runs queued jobs one at a time, until none is left.
    pub(crate) fn run_all(self: &Arc<Self>) -> usize {
        let executor = SerialExecutorRef::Custom(self.clone());
        let mut ran = 0;

        loop {
            // Jobs enqueue on this executor while they run.
            let Some(job) = self.jobs.lock().pop_front() else {
                break;
            };
            run_job(job, &executor);
            ran += 1;
        }

        ran
    }
}

impl SerialExecutor for QueueExecutor {
    fn enqueue(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    fn check_isolated(&self) {
        assert!(self.trusts_caller, "queue executor cannot prove isolation");
    }
}

/// Task executor holding jobs until the test runs them on a given serial
/// executor.
#[derive(Default)]
pub(crate) struct QueueTaskExecutor {
    jobs: Mutex<VecDeque<Job>>,
}

impl QueueTaskExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn num_queued(&self) -> usize {
        self.jobs.lock().len()
    }

    pub(crate) fn run_all(self: &Arc<Self>, executor: &SerialExecutorRef) -> usize {
        let mut ran = 0;

        loop {
            let Some(job) = self.jobs.lock().pop_front() else {
                break;
            };
            run_job_on_task_executor(job, executor, TaskExecutorRef::new(self.clone()));
            ran += 1;
        }

        ran
    }
}

impl TaskExecutor for QueueTaskExecutor {
    fn enqueue(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}

/// Counts how many times actor finalizers built from it ran.
#[derive(Debug, Clone, Default)]
pub(crate) struct CountingFinalizer(Arc<AtomicUsize>);

impl CountingFinalizer {
    pub(crate) fn finalizer(&self) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.0);
        move || {
            count.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}
