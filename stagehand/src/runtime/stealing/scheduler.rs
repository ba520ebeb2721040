use crate::job::Job;
use crate::runtime::stealing::context;
use crate::runtime::stealing::pool::ThreadPool;
use crate::runtime::stealing::Shared;
use crate::runtime::{RuntimeConfig, Schedule};
#[allow(unused)]
use crate::utils::scheduler::{Call, Method, Tracker};
use anyhow::{Result, anyhow};
use crossbeam_deque::{Injector, Steal};
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) struct Scheduler {
    /// Runtime configuration shared with every worker.
    pub(crate) cfg: RuntimeConfig,

    /// The global injector queue, fed by threads outside the pool.
    pub(crate) injector: Injector<Job>,

    pub(crate) shared: Shared,

    pool: Mutex<Option<ThreadPool>>,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Scheduler {
    pub(crate) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            injector: Injector::new(),
            shared: Shared::new(cfg.worker_threads),
            pool: Mutex::new(None),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Arc::new(self))
    }

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

        if self.shared.is_shutdown() {
            warn!(?job, "dropping job scheduled after shutdown");
            return;
        }

        // Jobs scheduled from one of our workers stay on its local queue, where
        // the cache is hot and the others may steal them.
        match context::current_worker() {
            Some(worker) if worker.belongs_to(self) => worker.push_local(job),
            _ => self.injector.push(job),
        }

        self.shared.unpark_one_thread();
    }
}

impl Handle {
    pub(crate) fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn spawn_workers(&self) -> Result<()> {
        let pool = ThreadPool::spawn(self)?;
        *self.pool.lock() = Some(pool);
        Ok(())
    }

    /// Stops every worker and waits for their threads to exit. Jobs left on
    /// the global queue are dropped.
    pub(crate) fn shutdown(&self) -> Result<()> {
        if context::current_worker().is_some_and(|worker| worker.belongs_to(self)) {
            return Err(anyhow!(
                "cannot shut down the runtime from one of its worker threads"
            ));
        }

        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let unparked = self.shared.unpark_all_threads();
        debug!(unparked, "shutting down stealing scheduler");

        let pool = self.pool.lock().take();
        let res = pool.map_or(Ok(()), ThreadPool::join_all);

        let mut dropped = 0;
        loop {
            match self.injector.steal() {
                Steal::Success(job) => {
                    dropped += 1;
                    drop(job);
                }
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }

        if dropped > 0 {
            warn!(dropped, "dropping jobs queued at shutdown");
        }

        res
    }
}

impl Deref for Handle {
    type Target = Arc<Scheduler>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
