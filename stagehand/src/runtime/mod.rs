use crate::job::Job;

// Public API
#[allow(clippy::module_inception)]
pub mod runtime;
pub use runtime::{Builder, Runtime};

mod spawn;
pub use spawn::SpawnBuilder;

// Exports
pub(crate) mod local;

pub(crate) use runtime::RuntimeConfig;

pub(crate) mod stealing;

mod ticker;

/// The global concurrent pool. Runs jobs on the generic executor.
pub(crate) trait Schedule: Send + Sync + 'static {
    /// Submits `job`. Never runs it inline.
    fn schedule(&self, job: Job);
}

/// Handle to the global pool of a runtime.
#[derive(Debug, Clone)]
pub(crate) enum Scheduler {
    Local(local::Handle),
    Stealing(stealing::Handle),
}

impl Scheduler {
    pub(crate) fn cfg(&self) -> &RuntimeConfig {
        match self {
            Scheduler::Local(handle) => &handle.cfg,
            Scheduler::Stealing(handle) => &handle.cfg,
        }
    }
}

impl Schedule for Scheduler {
    fn schedule(&self, job: Job) {
        match self {
            Scheduler::Local(handle) => handle.schedule(job),
            Scheduler::Stealing(handle) => handle.schedule(job),
        }
    }
}
