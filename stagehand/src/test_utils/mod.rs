// Exports
mod context;
pub(crate) use context::{init_local_runtime, init_stealing_runtime, init_tracing};

pub(crate) mod mocks;
pub(crate) use mocks::{CountingFinalizer, QueueExecutor, QueueTaskExecutor};

pub(crate) mod spy;
pub(crate) use spy::RecordingEscalation;

use crate::job::{Job, JobPriority};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared log jobs append to, to assert on execution order.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunLog(Arc<Mutex<Vec<&'static str>>>);

impl RunLog {
    pub(crate) fn job(&self, priority: JobPriority, name: &'static str) -> Job {
        let log = self.clone();
        Job::new(priority, move || log.push(name))
    }

    pub(crate) fn push(&self, name: &'static str) {
        self.0.lock().push(name);
    }

    pub(crate) fn entries(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// Spins until `cond` holds. Panics after a generous deadline so a broken
/// stealing test fails instead of hanging.
#[track_caller]
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}
