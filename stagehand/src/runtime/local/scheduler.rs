use crate::executor::{SerialExecutorRef, run_job};
use crate::job::Job;
use crate::runtime::{RuntimeConfig, Schedule};
#[allow(unused)]
use crate::utils::scheduler::{Call, Method, Tracker};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

#[derive(Debug)]
pub(crate) struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    /// FIFO of jobs waiting for the owning thread.
    queue: Mutex<VecDeque<Job>>,

    /// Signaled when a job is queued from another thread.
    cond: Condvar,

    shutdown: AtomicBool,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Scheduler {
    pub(crate) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Arc::new(self))
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    // Small price to pay to get introspection on all scheduler calls during
    // testing. No op in release builds.
    #[allow(unused)]
    #[inline(always)]
    fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Handle(Arc<Scheduler>);

impl Schedule for Handle {
    fn schedule(&self, job: Job) {
        self.track(
            Method::Schedule,
            Call::Schedule {
                priority: job.priority(),
                processes_actor: job.is_processing_job(),
            },
        );

        if self.is_shutdown() {
            warn!(?job, "dropping job scheduled after shutdown");
            return;
        }

        self.queue.lock().push_back(job);
        self.cond.notify_one();
    }
}

impl Handle {
    pub(crate) fn downgrade(&self) -> Weak<Scheduler> {
        Arc::downgrade(&self.0)
    }

    /// Runs queued jobs on the current thread until the queue is empty.
    /// Returns how many jobs ran.
    pub(crate) fn run_until_idle(&self) -> usize {
        let mut ran = 0;

        loop {
            // Never hold the queue lock while a job runs, jobs schedule more jobs.
            let job = self.queue.lock().pop_front();
            let Some(job) = job else {
                break;
            };

            run_job(job, &SerialExecutorRef::Generic);
            ran += 1;
        }

        ran
    }

    /// Blocks until a job is queued, or `timeout` elapsed.
    pub(crate) fn wait_for_jobs(&self, timeout: Duration) {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            self.cond.wait_for(&mut queue, timeout);
        }
    }

    #[allow(unused)]
    pub(crate) fn num_queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drops every queued job. Returns `false` if the scheduler was already
    /// shut down.
    pub(crate) fn shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }

        // Dropping jobs may run finalizers that schedule, so not under the lock.
        let dropped = std::mem::take(&mut *self.queue.lock());
        if !dropped.is_empty() {
            warn!(dropped = dropped.len(), "dropping jobs queued at shutdown");
        }
        drop(dropped);

        true
    }
}

impl Deref for Handle {
    type Target = Arc<Scheduler>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
